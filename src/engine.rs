//! Wires the state machine, log handle, and background tasks into one
//! running node.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::config::AppConfig;
use crate::consensus::CommandLog;
use crate::executor::Executor;
use crate::expirer::Expirer;
use crate::flusher::Flusher;
use crate::fsm::MemDb;
use crate::script::ScriptRunner;
use crate::store::Store;

pub struct Engine {
    pub store: Arc<Store>,
    shutdown: broadcast::Sender<()>,
}

impl Engine {
    /// Build the store and spawn the executor, flusher, and expirer.
    pub fn start(
        config: &AppConfig,
        db: Arc<MemDb>,
        log: Arc<dyn CommandLog>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        let store = Arc::new(Store::new(db, log, config.windows.defaults()));
        let (exec_tx, exec_rx) = mpsc::channel(config.executor.queue_capacity);
        let (shutdown, _) = broadcast::channel(1);

        Arc::new(Executor::new(store.clone(), runner)).start(exec_rx);
        Flusher::new(
            store.clone(),
            exec_tx,
            Duration::from_millis(config.flusher.tick_interval_ms),
            shutdown.subscribe(),
        )
        .start();
        Expirer::new(
            store.clone(),
            config.history.max_history,
            Duration::from_secs(config.history.expire_interval_secs),
            shutdown.subscribe(),
        )
        .start();

        Self { store, shutdown }
    }

    /// Signal the flusher and expirer to stop. Dropping the flusher closes
    /// the executor queue, so the executor drains what it holds and exits;
    /// in-flight hook posts whose `flush_bucket` never committed are
    /// recomputed after restart.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}
