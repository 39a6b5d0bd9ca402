//! Simulated key-delivery API.
//!
//! Serves the same two GET routes a physical key-delivery endpoint exposes,
//! backed by the process-local single-use key store. Mounted only when
//! `simulate_key_delivery` is enabled; lab deployments point both ends'
//! `key_delivery_url` at the instance serving these routes so minted and
//! redeemed identifiers resolve against one store.

use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use common::prelude::KeySourceError;

use crate::ServiceState;

pub mod dec_keys;
pub mod enc_keys;

/// Wire container for delivered keys; also what the key-delivery client
/// parses off a real endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyContainer {
    pub keys: Vec<KeyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    #[serde(rename = "key_ID")]
    pub key_id: String,
    /// Key bytes, base64.
    pub key: String,
}

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/:target_sae/enc_keys", get(enc_keys::handler))
        .route("/:target_sae/dec_keys", get(dec_keys::handler))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum KeysApiError {
    #[error("key delivery simulation is not enabled")]
    Disabled,
    #[error("only number=1 is supported")]
    UnsupportedNumber,
    #[error(transparent)]
    Source(#[from] KeySourceError),
}

impl IntoResponse for KeysApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            KeysApiError::Disabled => http::StatusCode::NOT_FOUND,
            KeysApiError::UnsupportedNumber => http::StatusCode::BAD_REQUEST,
            KeysApiError::Source(KeySourceError::NotFound(_)) => http::StatusCode::NOT_FOUND,
            KeysApiError::Source(KeySourceError::Exhausted) => {
                http::StatusCode::SERVICE_UNAVAILABLE
            }
            KeysApiError::Source(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
