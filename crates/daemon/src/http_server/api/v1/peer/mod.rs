//! Peer protocol endpoint.
//!
//! The three messages a counterpart can send for a relationship, each its
//! own route. A message that does not match the relationship's current
//! round state is answered with 409 — never silently ignored — so a
//! misbehaving peer hears about it. Upstream key-delivery trouble maps to
//! 502/503, which the counterpart treats as retryable.

use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

use common::prelude::{ExchangeError, RelationshipId};

use crate::ServiceState;

pub mod confirm;
pub mod new;
pub mod rotate;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/:relationship_id/new", post(new::handler))
        .route("/:relationship_id/rotate", post(rotate::handler))
        .route("/:relationship_id/confirm", post(confirm::handler))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum PeerApiError {
    #[error("unknown relationship: {0}")]
    UnknownRelationship(RelationshipId),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl IntoResponse for PeerApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            PeerApiError::UnknownRelationship(_) => http::StatusCode::NOT_FOUND,
            PeerApiError::Exchange(ExchangeError::Protocol(_)) => http::StatusCode::CONFLICT,
            PeerApiError::Exchange(ExchangeError::Exhausted) => {
                http::StatusCode::SERVICE_UNAVAILABLE
            }
            PeerApiError::Exchange(ExchangeError::Transport(_)) => http::StatusCode::BAD_GATEWAY,
        };
        tracing::warn!(%status, error = %self, "peer request refused");
        (status, self.to_string()).into_response()
    }
}
