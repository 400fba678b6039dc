//! Liveness, readiness and metrics endpoints.
//!
//! - `GET /alive` - always 200 while the process runs
//! - `GET /ready` - 200 with the operator's uptime
//! - `GET /metrics` - Prometheus text exposition

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics::describe_counter;
use metrics::describe_histogram;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;

use cronprimer_core::metrics::{duration_buckets, names};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const HISTOGRAM_PREFIX: &str = "prescalecronjoboperator_cronjob_time";

/// Installs the global Prometheus recorder.
///
/// Safe to call multiple times; subsequent calls return the installed handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be built or installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix(HISTOGRAM_PREFIX.to_string()),
            &duration_buckets(),
        )?
        .install_recorder()?;

    describe_counter!(
        names::CRONJOB_ACTION_TOTAL,
        "Create, update and delete actions against derived cronjobs"
    );
    describe_histogram!(
        names::TIME_TO_SCHEDULE,
        metrics::Unit::Seconds,
        "Time from pod creation to scheduling"
    );
    describe_histogram!(
        names::TIME_INIT_CONTAINER_RAN,
        metrics::Unit::Seconds,
        "Time the warm-up init container ran"
    );
    describe_histogram!(
        names::TIME_TO_START_WORKLOAD,
        metrics::Unit::Seconds,
        "Time from warm-up exit to workload start"
    );
    describe_histogram!(
        names::TIME_DELAY_OF_WORKLOAD,
        metrics::Unit::Seconds,
        "Workload start relative to the original schedule"
    );

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Shared state of the probe server.
#[derive(Debug)]
pub struct ProbeState {
    started_at: Instant,
}

impl ProbeState {
    /// State for a process that started now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }
}

impl Default for ProbeState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct AliveResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    uptime_secs: u64,
}

async fn alive() -> impl IntoResponse {
    Json(AliveResponse { status: "ok" })
}

async fn ready(State(state): State<Arc<ProbeState>>) -> impl IntoResponse {
    Json(ReadyResponse {
        status: "ready",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn serve_metrics() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Builds the probe router.
pub fn router(state: Arc<ProbeState>) -> Router {
    Router::new()
        .route("/alive", get(alive))
        .route("/ready", get(ready))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

/// Serves the probe endpoints on `port` until the process exits.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "starting probe server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(Arc::new(ProbeState::new()))).await
}
