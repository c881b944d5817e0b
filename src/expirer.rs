//! The expirer: a low-frequency task that caps execution history.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::store::Store;

pub struct Expirer {
    store: Arc<Store>,
    max_history: usize,
    interval: Duration,
    quit_rx: broadcast::Receiver<()>,
}

impl Expirer {
    pub fn new(
        store: Arc<Store>,
        max_history: usize,
        interval: Duration,
        quit_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            store,
            max_history,
            interval,
            quit_rx,
        }
    }

    pub fn start(mut self) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {},
                    _ = self.quit_rx.recv() => {
                        info!("expirer stopping");
                        break;
                    }
                }
                self.tick().await;
            }
        });
    }

    /// Remove the oldest records (by `created_at`, ties broken
    /// lexicographically by id) until the total count is back under the
    /// cap. Removals are log entries, so followers converge too.
    pub(crate) async fn tick(&self) {
        if !self.store.is_leader() {
            return;
        }

        let total = self.store.get_total_records_count();
        if total <= self.max_history {
            return;
        }

        let excess = total - self.max_history;
        let mut removed = 0usize;
        for record_id in self.store.oldest_record_ids(excess) {
            if let Err(e) = self.store.remove_record(&record_id).await {
                error!(record_id = %record_id, error = %e, "failed to expire record");
                break;
            }
            removed += 1;
        }
        info!(removed, total, cap = self.max_history, "trimmed execution history");
    }
}
