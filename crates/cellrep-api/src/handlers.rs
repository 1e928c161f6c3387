//! HTTP handlers for both listeners.
//!
//! Control handlers (stop, cancel, evacuate) acknowledge with 202 once the
//! request has been handed to the executor; executor failures are logged,
//! not reported to the caller.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use cellrep_models::{Work, lrp_container_guid};

use crate::RepState;
use crate::executor::Container;

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": msg }))).into_response()
}

// ── Auction ───────────────────────────────────────────────────

/// GET /state
pub async fn state(State(state): State<RepState>) -> impl IntoResponse {
    match state.rep.state() {
        Ok(cell_state) => Json(cell_state).into_response(),
        Err(e) => {
            error!(error = %e, "failed to fetch cell state");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /work
pub async fn perform(State(state): State<RepState>, body: Bytes) -> impl IntoResponse {
    let work: Work = match serde_json::from_slice(&body) {
        Ok(work) => work,
        Err(e) => {
            warn!(error = %e, "failed to decode work");
            return error_response(&e.to_string(), StatusCode::BAD_REQUEST);
        }
    };

    debug!(lrps = work.lrps.len(), tasks = work.tasks.len(), "performing work");
    match state.rep.perform(work) {
        Ok(failed) => Json(failed).into_response(),
        Err(e) => {
            error!(error = %e, "failed to perform work");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Control ───────────────────────────────────────────────────

/// POST /v1/lrps/:process_guid/instances/:instance_guid/stop
pub async fn stop_lrp_instance(
    State(state): State<RepState>,
    Path((process_guid, instance_guid)): Path<(String, String)>,
) -> impl IntoResponse {
    info!(%process_guid, %instance_guid, "stopping lrp instance");
    let container_guid = lrp_container_guid(&process_guid, &instance_guid);
    if let Err(e) = state.rep.executor().stop_container(&container_guid) {
        error!(%process_guid, %instance_guid, error = %e, "failed to stop container");
    }
    StatusCode::ACCEPTED
}

/// POST /v1/tasks/:task_guid/cancel
pub async fn cancel_task(State(state): State<RepState>, Path(task_guid): Path<String>) -> impl IntoResponse {
    info!(%task_guid, "cancelling task");
    if let Err(e) = state.rep.executor().delete_container(&task_guid) {
        error!(%task_guid, error = %e, "failed to delete container");
    }
    StatusCode::ACCEPTED
}

/// POST /sim/reset
pub async fn reset(State(state): State<RepState>) -> impl IntoResponse {
    match state.rep.executor().reset() {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!(error = %e, "failed to reset executor");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Operator ──────────────────────────────────────────────────

/// GET /ping
pub async fn ping() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Serialize)]
struct EvacuationResponse {
    ping_path: &'static str,
}

/// POST /evacuate
pub async fn evacuate(State(state): State<RepState>) -> impl IntoResponse {
    if !state.rep.evacuation().evacuating() {
        info!(cell = %state.rep.cell_id(), "evacuation requested");
    }
    state.rep.evacuation().set_evacuating();
    (
        StatusCode::ACCEPTED,
        Json(EvacuationResponse {
            ping_path: cellrep_client::routes::PING.path,
        }),
    )
}

/// GET /v1/containers
pub async fn list_containers(State(state): State<RepState>) -> impl IntoResponse {
    match state.rep.executor().list_containers() {
        Ok(containers) => Json::<Vec<Container>>(containers).into_response(),
        Err(e) => {
            error!(error = %e, "failed to fetch containers");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
