//! Shared test infrastructure: an in-process simulated replication log, an
//! HTTP hook sink, and a closure-backed script runner.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value as JsonValue;

use crate::command::Command;
use crate::config::WindowsConfig;
use crate::consensus::{CommandLog, APPLY_TIMEOUT};
use crate::error::StoreError;
use crate::fsm::MemDb;
use crate::script::ScriptRunner;
use crate::store::Store;
use crate::types::Bucket;

/// An N-member cluster sharing one in-process log.
///
/// Exactly one member is leader at a time; a committed entry is applied to
/// every member's state machine in commit order (the commit lock serializes
/// concurrent submissions), so the members stay byte-identical the way real
/// replicas do after consuming the same log prefix.
pub struct SimCluster {
    inner: Arc<SimInner>,
}

struct SimInner {
    members: Vec<Arc<MemDb>>,
    leader: AtomicUsize,
    commit: tokio::sync::Mutex<u64>,
}

impl SimCluster {
    pub fn new(n: usize) -> Self {
        Self {
            inner: Arc::new(SimInner {
                members: (0..n).map(|_| Arc::new(MemDb::new())).collect(),
                leader: AtomicUsize::new(0),
                commit: tokio::sync::Mutex::new(0),
            }),
        }
    }

    pub fn db(&self, member: usize) -> Arc<MemDb> {
        self.inner.members[member].clone()
    }

    pub fn log(&self, member: usize) -> Arc<dyn CommandLog> {
        Arc::new(SimLog {
            inner: self.inner.clone(),
            member,
        })
    }

    /// A store facade bound to one member, with default windows.
    pub fn store(&self, member: usize) -> Store {
        Store::new(
            self.db(member),
            self.log(member),
            WindowsConfig::default().defaults(),
        )
    }

    pub fn leader(&self) -> usize {
        self.inner.leader.load(Ordering::SeqCst)
    }

    /// Depose the current leader and elect the next member. Returns the
    /// new leader index.
    pub fn fail_leader(&self) -> usize {
        let old = self.inner.leader.load(Ordering::SeqCst);
        let new = (old + 1) % self.inner.members.len();
        self.inner.leader.store(new, Ordering::SeqCst);
        new
    }
}

struct SimLog {
    inner: Arc<SimInner>,
    member: usize,
}

#[async_trait]
impl CommandLog for SimLog {
    fn is_leader(&self) -> bool {
        self.inner.leader.load(Ordering::SeqCst) == self.member
    }

    async fn apply(&self, entry: Vec<u8>) -> Result<(), StoreError> {
        if !self.is_leader() {
            return Err(StoreError::NotLeader);
        }
        let mut committed = tokio::time::timeout(APPLY_TIMEOUT, self.inner.commit.lock())
            .await
            .map_err(|_| StoreError::Timeout(APPLY_TIMEOUT))?;
        // Leadership may have moved while waiting for the commit slot.
        if !self.is_leader() {
            return Err(StoreError::NotLeader);
        }
        let cmd = Command::decode(&entry)?;
        for db in &self.inner.members {
            db.apply(&cmd);
        }
        *committed += 1;
        Ok(())
    }

    async fn join(&self, _node_id: &str, _addr: &str) -> Result<(), StoreError> {
        if !self.is_leader() {
            return Err(StoreError::NotLeader);
        }
        Ok(())
    }
}

#[derive(Clone)]
struct SinkState {
    status: u16,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<JsonValue>>>,
}

/// An HTTP endpoint that records every delivery and answers with a fixed
/// status code.
pub struct HookSink {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<JsonValue>>>,
}

impl HookSink {
    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<JsonValue> {
        self.bodies.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub async fn spawn_hook_sink(status: u16) -> HookSink {
    let state = SinkState {
        status,
        hits: Arc::new(AtomicUsize::new(0)),
        bodies: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/hook", post(sink_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind hook sink");
    let addr = listener.local_addr().expect("hook sink addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve hook sink");
    });

    HookSink {
        addr,
        hits: state.hits,
        bodies: state.bodies,
    }
}

async fn sink_handler(State(state): State<SinkState>, Json(body): Json<JsonValue>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .bodies
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(body);
    StatusCode::from_u16(state.status).expect("valid sink status")
}

/// Script runner backed by a closure.
pub struct FnRunner<F> {
    f: F,
}

impl<F> FnRunner<F>
where
    F: Fn(&[u8], &Bucket) -> Option<JsonValue> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ScriptRunner for FnRunner<F>
where
    F: Fn(&[u8], &Bucket) -> Option<JsonValue> + Send + Sync,
{
    fn execute(&self, script: &[u8], bucket: &Bucket) -> Option<JsonValue> {
        (self.f)(script, bucket)
    }
}
