use axum::Router;

pub mod keys;
pub mod peer;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    let router = Router::new().nest("/peer", peer::router(state.clone()));

    // The simulated key-delivery API only exists when configured.
    let router = if state.simulator().is_some() {
        router.nest("/keys", keys::router(state.clone()))
    } else {
        router
    };

    router.with_state(state)
}
