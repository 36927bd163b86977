//! HTTP trigger and status service.
//!
//! `POST /run` starts a harvest in the background, `GET /status` reports
//! whether one is in flight and `POST /export` writes the dataset files. At
//! most one run is active at a time; the gate is owned by [`RunController`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Local, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::export::export_dataset;
use crate::harvest::{HarvestError, Harvester};
use crate::shutdown::Shutdown;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

// ─── Run controller ──────────────────────────────────────────────────────────

struct ActiveRun {
    handle: JoinHandle<()>,
    shutdown: Shutdown,
}

/// Clears the running flag when the background task ends, however it ends.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-slot gate around background harvest runs.
pub struct RunController {
    harvester: Harvester,
    running: Arc<AtomicBool>,
    active: Mutex<Option<ActiveRun>>,
}

impl RunController {
    pub fn new(harvester: Harvester) -> Self {
        Self {
            harvester,
            running: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a run unless one is already active. Returns the start time, or
    /// `None` when the slot is taken.
    pub fn try_start(&self) -> Option<DateTime<Utc>> {
        // Held until the new handle is stored, so a start that races a run
        // finishing early cannot have its handle overwritten by ours.
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let guard = RunGuard(Arc::clone(&self.running));
        let shutdown = Shutdown::new();
        let harvester = self.harvester.clone();
        let run_shutdown = shutdown.clone();
        let started_at = Utc::now();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            match harvester.run(&run_shutdown).await {
                Ok(report) => tracing::info!(
                    saved = report.saved,
                    cancelled = report.cancelled,
                    "Background run finished"
                ),
                Err(HarvestError::Cancelled) => tracing::info!("Background run cancelled"),
                Err(e) => tracing::error!(error = %e, "Background run failed"),
            }
        });

        *active = Some(ActiveRun { handle, shutdown });
        Some(started_at)
    }

    fn take_active(&self) -> Option<ActiveRun> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait for the current run, if any, to finish on its own.
    pub async fn wait(&self) {
        if let Some(run) = self.take_active()
            && let Err(e) = run.handle.await
        {
            tracing::error!(error = %e, "Background run panicked");
        }
    }

    /// Cancel the current run, if any, and wait for it to wind down.
    pub async fn shutdown(&self) {
        if let Some(run) = self.take_active() {
            tracing::info!("Cancelling background run");
            run.shutdown.trigger();
            if let Err(e) = run.handle.await {
                tracing::error!(error = %e, "Background run panicked");
            }
        }
    }
}

// ─── HTTP surface ────────────────────────────────────────────────────────────

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RunController>,
    pub db: Arc<DatabaseConnection>,
    pub export_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct StartedResponse {
    status: &'static str,
    time: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    running: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Routes of the trigger service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_handler))
        .route("/status", get(status_handler))
        .route("/export", post(export_handler))
        .with_state(state)
}

async fn run_handler(State(state): State<AppState>) -> Response {
    match state.controller.try_start() {
        Some(started_at) => {
            tracing::info!("Run triggered over HTTP");
            (
                StatusCode::ACCEPTED,
                Json(StartedResponse {
                    status: "started",
                    time: started_at.to_rfc3339(),
                }),
            )
                .into_response()
        }
        None => error_response(StatusCode::CONFLICT, "already running"),
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.controller.is_running(),
    })
}

async fn export_handler(State(state): State<AppState>) -> Response {
    match export_dataset(&state.db, &state.export_dir, Local::now().naive_local()).await {
        Ok(paths) => Json(paths).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Serve until `shutdown` fires, then cancel any in-flight run and wait
/// for it.
///
/// # Errors
/// Fails when the address cannot be bound or the listener breaks.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: Shutdown) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!("Listening on http://{addr}");

    let controller = Arc::clone(&state.controller);
    let signal = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await
        .map_err(ServerError::Serve)?;

    controller.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}
