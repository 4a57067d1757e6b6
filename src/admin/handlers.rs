use std::sync::atomic::Ordering;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tokio::runtime::Handle;

use super::AdminState;

pub const READY_BODY: &str = "Ready!";
pub const NOT_READY_BODY: &str = "Not ready!";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Serialize)]
pub struct RuntimeStats {
    pub workers: usize,
    pub alive_tasks: usize,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
}

pub async fn ready(State(state): State<AdminState>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, READY_BODY)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_BODY)
    }
}

pub async fn metrics(State(state): State<AdminState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render(),
    )
}

pub async fn pprof_index() -> &'static str {
    "/debug/pprof/\n\
     \n\
     runtime  Tokio worker threads, alive tasks and uptime\n\
     build    crate name and version\n"
}

pub async fn pprof_runtime(State(state): State<AdminState>) -> Json<RuntimeStats> {
    let metrics = Handle::current().metrics();
    Json(RuntimeStats {
        workers: metrics.num_workers(),
        alive_tasks: metrics.num_alive_tasks(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn pprof_unknown(Path(profile): Path<String>) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, format!("Unknown profile: {}\n", profile))
}

pub async fn pprof_build() -> Json<BuildInfo> {
    Json(BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
