use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use common::key_source::KeySource;
use common::prelude::SaeId;

use super::{KeyContainer, KeyEntry, KeysApiError};
use crate::ServiceState;

fn default_number() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct EncKeysParams {
    #[serde(default = "default_number")]
    pub number: u32,
}

/// Mint a fresh one-time key for `target_sae`. The key leaves the store
/// here; the only remaining copy is the pending redemption by identifier.
pub async fn handler(
    State(state): State<ServiceState>,
    Path(target_sae): Path<SaeId>,
    Query(params): Query<EncKeysParams>,
) -> Result<Json<KeyContainer>, KeysApiError> {
    let source = state.simulator().ok_or(KeysApiError::Disabled)?;
    if params.number != 1 {
        return Err(KeysApiError::UnsupportedNumber);
    }

    let material = source.mint(&SaeId::from("simulator"), &target_sae).await?;

    Ok(Json(KeyContainer {
        keys: vec![KeyEntry {
            key_id: material.key_id.as_str().to_string(),
            key: STANDARD.encode(material.secret.as_slice()),
        }],
    }))
}
