//! The flusher: a periodic scan that hands ready buckets to the executor
//! and empties them from replicated state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::store::Store;
use crate::types::Bucket;

/// How long a tick may block handing a snapshot to a full executor queue
/// before giving up and retrying on the next tick.
const HANDOFF_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Flusher {
    store: Arc<Store>,
    exec_tx: mpsc::Sender<Bucket>,
    tick_interval: Duration,
    quit_rx: broadcast::Receiver<()>,
}

impl Flusher {
    pub fn new(
        store: Arc<Store>,
        exec_tx: mpsc::Sender<Bucket>,
        tick_interval: Duration,
        quit_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            store,
            exec_tx,
            tick_interval,
            quit_rx,
        }
    }

    /// Consume self and run the tick loop in a spawned tokio task.
    pub fn start(mut self) {
        tokio::spawn(async move {
            loop {
                self.tick().await;
                tokio::select! {
                    _ = tokio::time::sleep(self.tick_interval) => {},
                    _ = self.quit_rx.recv() => {
                        info!("flusher stopping");
                        break;
                    }
                }
            }
        });
    }

    /// One scan over a point-in-time copy of the bucket table.
    ///
    /// Gated on leadership: followers would only collect `NotLeader`
    /// rejections and must not enqueue executor work, or hook deliveries
    /// would duplicate across replicas.
    pub(crate) async fn tick(&self) {
        if !self.store.is_leader() {
            return;
        }

        let now = Utc::now();
        let buckets: HashMap<String, Bucket> = self.store.clone_buckets();
        for (rule_id, bucket) in buckets {
            if !bucket.can_flush(now) {
                continue;
            }
            debug!(rule_id = %rule_id, events = bucket.events.len(), "bucket ready to flush");

            // Hand the snapshot over before emptying state: it is a value
            // copy, so a log apply racing ahead cannot mutate it. If the
            // queue stays full past the timeout, skip the flush too: the
            // bucket still satisfies its predicate and the next tick
            // retries, preserving a delivery attempt per flush.
            if let Err(e) = self
                .exec_tx
                .send_timeout(bucket, HANDOFF_TIMEOUT)
                .await
            {
                warn!(rule_id = %rule_id, error = %e, "executor queue full, retrying next tick");
                continue;
            }

            if let Err(e) = self.store.flush_bucket(&rule_id).await {
                // Lost leadership or commit timeout: the executor may
                // deliver a bucket that is re-flushed later. Delivery is
                // at-least-once by design.
                error!(rule_id = %rule_id, error = %e, "flush_bucket failed");
            }
        }
    }
}
