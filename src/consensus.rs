//! The seam to the log-replication layer.
//!
//! The engine never talks to a consensus library directly; it submits
//! encoded commands through `CommandLog` and reads from its local replica.
//! A real deployment plugs a leader-based log-replication library in here;
//! `SoloLog` is what a one-member cluster degenerates to and is what the
//! bundled binary runs on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::command::Command;
use crate::error::StoreError;
use crate::fsm::MemDb;

/// How long a submitted entry may take to commit before the caller sees a
/// transient `Timeout`.
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the replicated command log.
#[async_trait]
pub trait CommandLog: Send + Sync {
    /// Whether this node is currently the leader. Mutations submitted
    /// elsewhere fail with `NotLeader`.
    fn is_leader(&self) -> bool;

    /// Submit an encoded command and block until it is committed and
    /// applied locally, or until `APPLY_TIMEOUT` elapses.
    async fn apply(&self, entry: Vec<u8>) -> Result<(), StoreError>;

    /// Add a node to the cluster.
    async fn join(&self, node_id: &str, addr: &str) -> Result<(), StoreError>;
}

/// Single-node log: every submission commits immediately against the local
/// state machine.
pub struct SoloLog {
    db: Arc<MemDb>,
}

impl SoloLog {
    pub fn new(db: Arc<MemDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CommandLog for SoloLog {
    fn is_leader(&self) -> bool {
        true
    }

    async fn apply(&self, entry: Vec<u8>) -> Result<(), StoreError> {
        let cmd = Command::decode(&entry)?;
        self.db.apply(&cmd);
        Ok(())
    }

    async fn join(&self, node_id: &str, addr: &str) -> Result<(), StoreError> {
        info!(node_id = %node_id, addr = %addr, "join on a single-node log has no peers to replicate to");
        Ok(())
    }
}
