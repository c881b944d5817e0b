//! The public store API: the command/query surface the HTTP layer consumes.
//!
//! Mutations are leader-only and travel through the replicated log; reads
//! are served from the local replica with bounded staleness and never take
//! a log round-trip.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::command::Command;
use crate::config::WindowDefaults;
use crate::consensus::CommandLog;
use crate::error::StoreError;
use crate::fsm::MemDb;
use crate::matcher::pattern_match;
use crate::types::{Bucket, Event, ExecutionRecord, JoinRequest, Rule};

pub struct Store {
    db: Arc<MemDb>,
    log: Arc<dyn CommandLog>,
    defaults: WindowDefaults,
}

impl Store {
    pub fn new(db: Arc<MemDb>, log: Arc<dyn CommandLog>, defaults: WindowDefaults) -> Self {
        Self { db, log, defaults }
    }

    pub fn is_leader(&self) -> bool {
        self.log.is_leader()
    }

    /// Encode and submit one command, blocking until it commits.
    async fn apply_cmd(&self, cmd: &Command) -> Result<(), StoreError> {
        if !self.log.is_leader() {
            return Err(StoreError::NotLeader);
        }
        let entry = cmd.encode()?;
        self.log.apply(entry).await
    }

    // =========================================================================
    // Mutations (leader-only)
    // =========================================================================

    /// Create a rule. A rule created with any window unset gets all three
    /// configured defaults, as one atomic substitution. Fails on a
    /// duplicate id.
    pub async fn add_rule(&self, mut rule: Rule) -> Result<(), StoreError> {
        if rule.id.is_empty() {
            return Err(StoreError::Validation("rule id is empty".to_string()));
        }
        if rule.windows_unset() {
            self.defaults.inject(&mut rule);
        }
        if self.db.rules.contains(&rule.id) {
            return Err(StoreError::Validation(format!(
                "rule {} already exists",
                rule.id
            )));
        }
        self.apply_cmd(&Command::add_rule(rule)).await
    }

    /// Replace an existing rule. The bucket is retained. All three windows
    /// must be set.
    pub async fn update_rule(&self, rule: Rule) -> Result<(), StoreError> {
        if rule.id.is_empty() {
            return Err(StoreError::Validation("rule id is empty".to_string()));
        }
        if rule.windows_unset() {
            return Err(StoreError::Validation(format!(
                "rule {} update has an unset window",
                rule.id
            )));
        }
        if !self.db.rules.contains(&rule.id) {
            return Err(StoreError::Validation(format!(
                "rule {} does not exist",
                rule.id
            )));
        }
        self.apply_cmd(&Command::update_rule(rule)).await
    }

    pub async fn remove_rule(&self, rule_id: &str) -> Result<(), StoreError> {
        self.apply_cmd(&Command::remove_rule(rule_id)).await
    }

    pub async fn add_script(&self, id: &str, script: Vec<u8>) -> Result<(), StoreError> {
        self.apply_cmd(&Command::add_script(id, script)).await
    }

    pub async fn update_script(&self, id: &str, script: Vec<u8>) -> Result<(), StoreError> {
        self.apply_cmd(&Command::update_script(id, script)).await
    }

    pub async fn remove_script(&self, id: &str) -> Result<(), StoreError> {
        self.apply_cmd(&Command::remove_script(id)).await
    }

    /// Ingest an event: submit one stash command per rule whose patterns
    /// match the event type. Submissions are sequential, so a single
    /// caller's events land in each bucket in the order it sent them.
    pub async fn stash(&self, event: Event) -> Result<(), StoreError> {
        for rule in self.db.rules.get_all() {
            if !pattern_match(&event.event_type, &rule.event_types) {
                continue;
            }
            // Stamp arrival on the leader and carry it in the payload so
            // the applier clock stays out of replicated state.
            let mut stamped = event.clone();
            stamped.stashed_at = Utc::now();
            debug!(rule_id = %rule.id, event_type = %event.event_type, "stashing matched event");
            self.apply_cmd(&Command::stash(&rule.id, stamped)).await?;
        }
        Ok(())
    }

    pub async fn flush_bucket(&self, rule_id: &str) -> Result<(), StoreError> {
        self.apply_cmd(&Command::flush_bucket(rule_id)).await
    }

    pub async fn add_record(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        self.apply_cmd(&Command::add_record(record)).await
    }

    pub async fn remove_record(&self, record_id: &str) -> Result<(), StoreError> {
        self.apply_cmd(&Command::remove_record(record_id)).await
    }

    // =========================================================================
    // Queries (local reads)
    // =========================================================================

    pub fn get_rule(&self, id: &str) -> Option<Rule> {
        self.db.rules.get(id)
    }

    pub fn get_rules(&self) -> Vec<Rule> {
        self.db.rules.get_all()
    }

    pub fn get_script(&self, id: &str) -> Option<Vec<u8>> {
        self.db.scripts.get(id)
    }

    pub fn get_scripts(&self) -> Vec<String> {
        self.db.scripts.ids()
    }

    pub fn get_records(&self, rule_id: &str) -> Vec<ExecutionRecord> {
        self.db.history.records_for_rule(rule_id)
    }

    pub fn get_records_count(&self, rule_id: &str) -> usize {
        self.db.history.count_for_rule(rule_id)
    }

    pub fn get_total_records_count(&self) -> usize {
        self.db.history.total_count()
    }

    /// Point-in-time copy of the bucket table for the flusher scan.
    pub fn clone_buckets(&self) -> HashMap<String, Bucket> {
        self.db.buckets.clone_map()
    }

    /// Ids of the `n` oldest execution records (created_at, then id).
    pub fn oldest_record_ids(&self, n: usize) -> Vec<String> {
        self.db.history.oldest(n)
    }

    // =========================================================================
    // Cluster
    // =========================================================================

    pub async fn join(&self, req: &JoinRequest) -> Result<(), StoreError> {
        req.validate().await?;
        self.log.join(&req.node_id, &req.addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowsConfig;
    use crate::consensus::SoloLog;
    use crate::testing::SimCluster;
    use serde_json::json;

    fn rule(id: &str, patterns: &[&str]) -> Rule {
        Rule {
            id: id.to_string(),
            event_types: patterns.iter().map(|s| s.to_string()).collect(),
            script_id: None,
            hook_endpoint: "http://127.0.0.1:1/hook".to_string(),
            hook_retry: 0,
            wait_window_ms: 1_000,
            wait_window_threshold_ms: 1_000,
            max_wait_window_ms: 5_000,
        }
    }

    fn solo_store() -> (Arc<MemDb>, Store) {
        let db = Arc::new(MemDb::new());
        let log = Arc::new(SoloLog::new(db.clone()));
        let store = Store::new(db.clone(), log, WindowsConfig::default().defaults());
        (db, store)
    }

    #[tokio::test]
    async fn add_rule_rejects_empty_id_and_duplicates() {
        let (_db, store) = solo_store();

        let err = store.add_rule(rule("", &["*"])).await.expect_err("empty id");
        assert!(matches!(err, StoreError::Validation(_)));

        store.add_rule(rule("r1", &["*"])).await.expect("first add");
        let err = store
            .add_rule(rule("r1", &["*"]))
            .await
            .expect_err("duplicate id");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn add_rule_injects_all_defaults_when_any_window_is_zero() {
        let (_db, store) = solo_store();
        let mut r = rule("r1", &["*"]);
        r.wait_window_ms = 0;
        r.wait_window_threshold_ms = 42;
        r.max_wait_window_ms = 42;
        store.add_rule(r).await.expect("add");

        let stored = store.get_rule("r1").expect("rule");
        assert_eq!(stored.wait_window_ms, 30_000);
        assert_eq!(stored.wait_window_threshold_ms, 60_000);
        assert_eq!(stored.max_wait_window_ms, 300_000);
    }

    #[tokio::test]
    async fn update_rule_requires_existence_and_set_windows() {
        let (_db, store) = solo_store();

        let err = store
            .update_rule(rule("ghost", &["*"]))
            .await
            .expect_err("unknown rule");
        assert!(matches!(err, StoreError::Validation(_)));

        store.add_rule(rule("r1", &["*"])).await.expect("add");
        let mut broken = rule("r1", &["*"]);
        broken.max_wait_window_ms = 0;
        let err = store.update_rule(broken).await.expect_err("zero window");
        assert!(matches!(err, StoreError::Validation(_)));

        let mut updated = rule("r1", &["order.*"]);
        updated.hook_retry = 5;
        store.update_rule(updated).await.expect("update");
        assert_eq!(store.get_rule("r1").expect("rule").hook_retry, 5);
    }

    #[tokio::test]
    async fn stash_expands_to_every_matching_rule() {
        let (db, store) = solo_store();
        store
            .add_rule(rule("orders", &["order.*"]))
            .await
            .expect("add orders");
        store
            .add_rule(rule("failures", &["*.failed"]))
            .await
            .expect("add failures");
        store
            .add_rule(rule("other", &["inventory.*"]))
            .await
            .expect("add other");

        store
            .stash(Event::new("order.failed", json!({"id": 7})))
            .await
            .expect("stash");

        assert_eq!(db.buckets.get("orders").expect("bucket").events.len(), 1);
        assert_eq!(db.buckets.get("failures").expect("bucket").events.len(), 1);
        assert!(db.buckets.get("other").expect("bucket").events.is_empty());
    }

    #[tokio::test]
    async fn mutations_on_a_follower_fail_with_not_leader() {
        let cluster = SimCluster::new(3);
        let follower = cluster.store(1);

        let err = follower
            .add_rule(rule("r1", &["*"]))
            .await
            .expect_err("follower write");
        assert!(matches!(err, StoreError::NotLeader));

        cluster.store(0).add_rule(rule("r1", &["*"])).await.expect("leader write");
        for member in 0..3 {
            assert!(cluster.store(member).get_rule("r1").is_some());
        }
    }

    #[tokio::test]
    async fn script_lifecycle_roundtrip() {
        let (_db, store) = solo_store();
        store.add_script("s1", b"v1".to_vec()).await.expect("add");
        store
            .update_script("s1", b"v2".to_vec())
            .await
            .expect("update");
        assert_eq!(store.get_script("s1").as_deref(), Some(&b"v2"[..]));
        assert_eq!(store.get_scripts(), vec!["s1".to_string()]);

        store.remove_script("s1").await.expect("remove");
        assert!(store.get_script("s1").is_none());
    }
}
