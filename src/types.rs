//! Core domain types: events, rules, buckets, execution records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::StoreError;

/// A single ingested event: an opaque payload tagged with a type.
///
/// `stashed_at` is stamped by the leader when the event is submitted and
/// carried in the command payload, so the applier never consults its own
/// clock and replicas cannot diverge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub payload: JsonValue,
    pub stashed_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            stashed_at: Utc::now(),
        }
    }
}

/// A rule binds a set of event-type glob patterns to a bucket window and a
/// hook endpoint. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub event_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    pub hook_endpoint: String,
    pub hook_retry: u32,
    pub wait_window_ms: u64,
    pub wait_window_threshold_ms: u64,
    pub max_wait_window_ms: u64,
}

impl Rule {
    /// True when any of the three windows is unset. Creation then replaces
    /// all three with the configured defaults, as a group.
    pub fn windows_unset(&self) -> bool {
        self.wait_window_ms == 0
            || self.wait_window_threshold_ms == 0
            || self.max_wait_window_ms == 0
    }
}

/// Per-rule buffer of events awaiting flush.
///
/// Created lazily on first stash, emptied by `flush_bucket`, destroyed with
/// its rule. Holds a snapshot of the owning rule so that a bucket handed to
/// the executor is self-contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub rule: Rule,
    pub events: Vec<Event>,
    pub first_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
}

impl Bucket {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            events: Vec::new(),
            first_at: None,
            last_at: None,
        }
    }

    /// Append an event, updating the first/last stash timestamps from the
    /// event's leader-stamped arrival time.
    pub fn append(&mut self, event: Event) {
        if self.first_at.is_none() {
            self.first_at = Some(event.stashed_at);
        }
        self.last_at = Some(event.stashed_at);
        self.events.push(event);
    }

    /// Empty the bucket and reset its timestamps.
    pub fn drain(&mut self) {
        self.events.clear();
        self.first_at = None;
        self.last_at = None;
    }

    /// The flush predicate. Pure over `(now, timestamps, rule windows)`:
    /// a non-empty bucket is flushable iff the hard cap has elapsed since
    /// the first event, or the stream has gone quiet for `wait_window` and
    /// the bucket is at least `wait_window_threshold` old.
    pub fn can_flush(&self, now: DateTime<Utc>) -> bool {
        if self.events.is_empty() {
            return false;
        }
        let (Some(first), Some(last)) = (self.first_at, self.last_at) else {
            return false;
        };

        let since_first = now - first;
        if since_first >= Duration::milliseconds(self.rule.max_wait_window_ms as i64) {
            return true;
        }
        now - last >= Duration::milliseconds(self.rule.wait_window_ms as i64)
            && since_first >= Duration::milliseconds(self.rule.wait_window_threshold_ms as i64)
    }
}

/// Immutable audit row describing one flush → script → hook cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub bucket: Bucket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_result: Option<JsonValue>,
    pub hook_status_code: u16,
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Build a record with a fresh id, stamped by the caller's (leader's)
    /// clock and carried in the `add_record` payload.
    pub fn new(bucket: Bucket, script_result: Option<JsonValue>, hook_status_code: u16) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bucket,
            script_result,
            hook_status_code,
            created_at: Utc::now(),
        }
    }
}

/// Request for a node to join the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    pub addr: String,
}

impl JoinRequest {
    /// A join is valid when the node id is non-empty and the advertised
    /// address answers a TCP dial within 3 seconds.
    pub async fn validate(&self) -> Result<(), StoreError> {
        if self.node_id.is_empty() {
            return Err(StoreError::Validation("nodeID is empty".to_string()));
        }

        let dial = tokio::net::TcpStream::connect(&self.addr);
        match tokio::time::timeout(std::time::Duration::from_secs(3), dial).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StoreError::Validation(format!(
                "invalid addr {}: {}",
                self.addr, e
            ))),
            Err(_) => Err(StoreError::Validation(format!(
                "invalid addr {}: connect timed out",
                self.addr
            ))),
        }
    }
}
