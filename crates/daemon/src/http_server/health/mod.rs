use axum::Router;

pub mod readiness;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/healthz", axum::routing::get(readiness::healthz))
        .route("/readyz", axum::routing::get(readiness::readyz))
        .with_state(state)
}
