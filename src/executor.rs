//! The executor: consumes flushed buckets, runs the optional script, posts
//! to the hook, and records the outcome.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::hook::HookClient;
use crate::script::ScriptRunner;
use crate::store::Store;
use crate::types::{Bucket, ExecutionRecord};

pub struct Executor {
    store: Arc<Store>,
    runner: Arc<dyn ScriptRunner>,
    hook: HookClient,
}

impl Executor {
    pub fn new(store: Arc<Store>, runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            store,
            runner,
            hook: HookClient::new(),
        }
    }

    /// Drain the queue in a spawned task. Each bucket's work runs in its
    /// own task so a slow hook does not stall subsequent deliveries; the
    /// degree of concurrency is bounded only by the queue.
    pub fn start(self: Arc<Self>, mut rx: mpsc::Receiver<Bucket>) {
        tokio::spawn(async move {
            while let Some(bucket) = rx.recv().await {
                let executor = self.clone();
                tokio::spawn(async move {
                    executor.run_bucket(bucket).await;
                });
            }
            info!("executor queue closed, stopping");
        });
    }

    /// One flush → script → hook → record cycle.
    pub(crate) async fn run_bucket(&self, bucket: Bucket) {
        debug!(
            rule_id = %bucket.rule.id,
            events = bucket.events.len(),
            "executing flushed bucket"
        );

        let script_result = bucket
            .rule
            .script_id
            .as_deref()
            .and_then(|id| self.store.get_script(id))
            .and_then(|script| self.runner.execute(&script, &bucket));

        // No script, or a nil result: the raw bucket is the payload.
        let payload = match &script_result {
            Some(value) => value.clone(),
            None => match serde_json::to_value(&bucket) {
                Ok(value) => value,
                Err(e) => {
                    error!(rule_id = %bucket.rule.id, error = %e, "bucket encoding failed, dropping delivery");
                    return;
                }
            },
        };

        let status = self
            .hook
            .post_with_retry(&payload, &bucket.rule.hook_endpoint, bucket.rule.hook_retry)
            .await;

        // The record's created_at is stamped here on the leader and
        // carried in the add_record payload.
        let record = ExecutionRecord::new(bucket, script_result, status);
        if let Err(e) = self.store.add_record(record).await {
            error!(error = %e, "failed to record execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowsConfig;
    use crate::consensus::SoloLog;
    use crate::fsm::MemDb;
    use crate::script::NoopRunner;
    use crate::testing::{spawn_hook_sink, FnRunner};
    use crate::types::{Event, Rule};
    use serde_json::json;

    fn rule(id: &str, hook: &str, script_id: Option<&str>) -> Rule {
        Rule {
            id: id.to_string(),
            event_types: vec!["*".to_string()],
            script_id: script_id.map(str::to_string),
            hook_endpoint: hook.to_string(),
            hook_retry: 0,
            wait_window_ms: 1_000,
            wait_window_threshold_ms: 1_000,
            max_wait_window_ms: 5_000,
        }
    }

    fn store() -> Arc<Store> {
        let db = Arc::new(MemDb::new());
        let log = Arc::new(SoloLog::new(db.clone()));
        Arc::new(Store::new(db, log, WindowsConfig::default().defaults()))
    }

    fn bucket_with_events(rule: Rule, n: usize) -> Bucket {
        let mut bucket = Bucket::new(rule);
        for i in 0..n {
            bucket.append(Event::new("foo.bar", json!({"n": i})));
        }
        bucket
    }

    #[tokio::test]
    async fn raw_bucket_is_posted_when_there_is_no_script() {
        let sink = spawn_hook_sink(200).await;
        let store = store();
        store
            .add_rule(rule("r1", &sink.url(), None))
            .await
            .expect("add rule");

        let executor = Executor::new(store.clone(), Arc::new(NoopRunner));
        executor
            .run_bucket(bucket_with_events(rule("r1", &sink.url(), None), 2))
            .await;

        assert_eq!(sink.hits(), 1);
        let body = &sink.bodies()[0];
        assert_eq!(body["rule"]["id"], json!("r1"));
        assert_eq!(body["events"].as_array().expect("events").len(), 2);

        let records = store.get_records("r1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hook_status_code, 200);
        assert!(records[0].script_result.is_none());
    }

    #[tokio::test]
    async fn script_result_replaces_the_payload_and_lands_in_the_record() {
        let sink = spawn_hook_sink(200).await;
        let store = store();
        store
            .add_rule(rule("r1", &sink.url(), Some("count")))
            .await
            .expect("add rule");
        store
            .add_script("count", b"count-events".to_vec())
            .await
            .expect("add script");

        let runner = FnRunner::new(|_script, bucket: &Bucket| {
            Some(json!({"count": bucket.events.len()}))
        });
        let executor = Executor::new(store.clone(), Arc::new(runner));
        executor
            .run_bucket(bucket_with_events(rule("r1", &sink.url(), Some("count")), 4))
            .await;

        assert_eq!(sink.bodies()[0], json!({"count": 4}));
        let records = store.get_records("r1");
        assert_eq!(records[0].script_result, Some(json!({"count": 4})));
    }

    #[tokio::test]
    async fn nil_script_result_falls_back_to_the_raw_bucket() {
        let sink = spawn_hook_sink(200).await;
        let store = store();
        store
            .add_rule(rule("r1", &sink.url(), Some("broken")))
            .await
            .expect("add rule");
        store
            .add_script("broken", b"syntax error".to_vec())
            .await
            .expect("add script");

        let runner = FnRunner::new(|_script, _bucket: &Bucket| None);
        let executor = Executor::new(store.clone(), Arc::new(runner));
        executor
            .run_bucket(bucket_with_events(rule("r1", &sink.url(), Some("broken")), 1))
            .await;

        let body = &sink.bodies()[0];
        assert_eq!(body["rule"]["id"], json!("r1"));
        assert!(store.get_records("r1")[0].script_result.is_none());
    }

    #[tokio::test]
    async fn hook_failure_status_is_recorded_not_raised() {
        let sink = spawn_hook_sink(404).await;
        let store = store();
        store
            .add_rule(rule("r1", &sink.url(), None))
            .await
            .expect("add rule");

        let executor = Executor::new(store.clone(), Arc::new(NoopRunner));
        executor
            .run_bucket(bucket_with_events(rule("r1", &sink.url(), None), 1))
            .await;

        let records = store.get_records("r1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hook_status_code, 404);
    }
}
