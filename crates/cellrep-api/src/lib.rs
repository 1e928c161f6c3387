//! cellrep-api: the cell's side of the auction protocol.
//!
//! A cell exposes two routers built from the same [`RepState`]:
//!
//! - the secure router (`state`, `work`, stop, cancel, sim reset), meant for
//!   the auctioneer and served over mutual TLS when TLS is required;
//! - the insecure router (`ping`, `evacuate`, container list), meant for
//!   local operators and always plaintext.
//!
//! Paths come from the shared route table in `cellrep_client::routes`.

pub mod error;
pub mod executor;
pub mod handlers;
pub mod rep;
pub mod server;

use std::sync::Arc;

use axum::Router;
use axum::routing::{MethodFilter, on};

use cellrep_client::RouteMethod;
use cellrep_client::routes::{
    CANCEL_TASK, CONTAINER_LIST, EVACUATE, PERFORM, PING, SIM_RESET, STATE, STOP_LRP_INSTANCE,
};

pub use error::{RepError, RepResult};
pub use executor::{
    AllocationFailure, AllocationRequest, Container, ContainerResource, ContainerState, Executor,
    SimExecutor,
};
pub use rep::{AuctionCellRep, CellSettings, EvacuationFlag};

/// Shared state for every handler.
#[derive(Clone)]
pub struct RepState {
    pub rep: Arc<AuctionCellRep>,
}

fn filter(method: RouteMethod) -> MethodFilter {
    match method {
        RouteMethod::Get => MethodFilter::GET,
        RouteMethod::Post => MethodFilter::POST,
    }
}

/// Routes for the auctioneer.
pub fn secure_router(state: RepState) -> Router {
    Router::new()
        .route(&STATE.axum_path(), on(filter(STATE.method), handlers::state))
        .route(&PERFORM.axum_path(), on(filter(PERFORM.method), handlers::perform))
        .route(
            &STOP_LRP_INSTANCE.axum_path(),
            on(filter(STOP_LRP_INSTANCE.method), handlers::stop_lrp_instance),
        )
        .route(&CANCEL_TASK.axum_path(), on(filter(CANCEL_TASK.method), handlers::cancel_task))
        .route(&SIM_RESET.axum_path(), on(filter(SIM_RESET.method), handlers::reset))
        .with_state(state)
}

/// Routes for local operators.
pub fn insecure_router(state: RepState) -> Router {
    Router::new()
        .route(&PING.axum_path(), on(filter(PING.method), handlers::ping))
        .route(&EVACUATE.axum_path(), on(filter(EVACUATE.method), handlers::evacuate))
        .route(
            &CONTAINER_LIST.axum_path(),
            on(filter(CONTAINER_LIST.method), handlers::list_containers),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cellrep_models::Resources;
    use tower::ServiceExt;

    use super::*;

    fn state() -> RepState {
        let executor = Arc::new(SimExecutor::new(Resources::new(100, 100, 2), vec![]));
        RepState {
            rep: Arc::new(AuctionCellRep::new(CellSettings::default(), executor, EvacuationFlag::default())),
        }
    }

    async fn status(router: Router, method: &str, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn secure_routes() {
        let router = secure_router(state());
        assert_eq!(status(router.clone(), "GET", "/state").await, StatusCode::OK);
        assert_eq!(
            status(router.clone(), "POST", "/v1/lrps/pg/instances/ig/stop").await,
            StatusCode::ACCEPTED
        );
        assert_eq!(status(router.clone(), "POST", "/v1/tasks/tg/cancel").await, StatusCode::ACCEPTED);
        assert_eq!(status(router.clone(), "POST", "/sim/reset").await, StatusCode::OK);
        assert_eq!(status(router.clone(), "POST", "/work").await, StatusCode::BAD_REQUEST);
        assert_eq!(status(router, "GET", "/ping").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn insecure_routes() {
        let router = insecure_router(state());
        assert_eq!(status(router.clone(), "GET", "/ping").await, StatusCode::OK);
        assert_eq!(status(router.clone(), "GET", "/v1/containers").await, StatusCode::OK);
        assert_eq!(status(router.clone(), "POST", "/evacuate").await, StatusCode::ACCEPTED);
        assert_eq!(status(router.clone(), "GET", "/evacuate").await, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(status(router, "GET", "/state").await, StatusCode::NOT_FOUND);
    }
}
