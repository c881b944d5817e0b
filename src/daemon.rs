use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde_json::json;
use tracing::info;

use crate::store::Store;

/// Start the health check HTTP server.
pub async fn start_health_server(port: u16, store: Arc<Store>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .with_state(store);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Health server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(store): State<Arc<Store>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "is_leader": store.is_leader(),
        "rules": store.get_rules().len(),
        "scripts": store.get_scripts().len(),
        "records": store.get_total_records_count(),
    }))
}
