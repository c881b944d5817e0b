//! The seam to the scripting sandbox.
//!
//! A script is an opaque blob; the sandbox is a pure function from
//! `(script, bucket)` to an optional JSON value. `None` (no script, a
//! script error, or a nil result) means "no transformation" and the raw
//! bucket is posted to the hook instead.

use serde_json::Value as JsonValue;

use crate::types::Bucket;

pub trait ScriptRunner: Send + Sync {
    fn execute(&self, script: &[u8], bucket: &Bucket) -> Option<JsonValue>;
}

/// Runner used when no sandbox is wired in: every bucket passes through
/// untransformed.
pub struct NoopRunner;

impl ScriptRunner for NoopRunner {
    fn execute(&self, _script: &[u8], _bucket: &Bucket) -> Option<JsonValue> {
        None
    }
}
