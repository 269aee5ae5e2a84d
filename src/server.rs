//! HTTP dispatch surface.
//!
//! A thin front door for enqueueing collection jobs: `POST /jobs` with a
//! `{"source": "git"}` body pushes onto the in-process queue consumed by
//! the embedded worker. The channel is bounded at one job, so dispatch
//! blocks rather than building a backlog.
//!
//! | Method | Path | Description |
//! |--------|----------|-------------------------------------|
//! | `POST` | `/jobs` | Enqueue a collection job for a source |
//! | `GET`  | `/health` | Liveness check (returns version)     |

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::traits::CollectorRegistry;
use crate::worker::{self, Job};

#[derive(Clone)]
struct AppState {
    tx: mpsc::Sender<Job>,
}

/// Run the dispatch endpoint with an embedded worker consuming the
/// queue. Serves until the process is terminated.
pub async fn run_server(config: Config, registry: Arc<CollectorRegistry>) -> Result<()> {
    let pool = db::connect(&config).await?;
    let (tx, queue) = worker::channel(1);

    let worker_config = config.clone();
    let worker_registry = registry.clone();
    let worker_pool = pool.clone();
    tokio::spawn(async move {
        if let Err(err) =
            worker::run_worker(&worker_config, &worker_registry, &worker_pool, queue).await
        {
            tracing::error!(error = %err, "worker stopped");
        }
    });

    let state = AppState { tx };
    let app = Router::new()
        .route("/jobs", post(enqueue_job))
        .route("/health", get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "dispatch endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn enqueue_job(State(state): State<AppState>, Json(job): Json<Job>) -> impl IntoResponse {
    let source = job.source.clone();
    match state.tx.send(job).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "queued", "source": source })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": { "code": "worker_gone", "message": "worker is not consuming jobs" }
            })),
        ),
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
