use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use common::key_source::{KeyId, KeySource};
use common::prelude::SaeId;

use super::{KeyContainer, KeyEntry, KeysApiError};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct DecKeysParams {
    /// Identifier of the key to redeem. Required; a request without it is
    /// rejected by the extractor.
    #[serde(rename = "key_ID")]
    pub key_id: String,
}

/// Redeem a previously minted key by identifier. Consuming: a second
/// request for the same identifier is a 404.
pub async fn handler(
    State(state): State<ServiceState>,
    Path(target_sae): Path<SaeId>,
    Query(params): Query<DecKeysParams>,
) -> Result<Json<KeyContainer>, KeysApiError> {
    let source = state.simulator().ok_or(KeysApiError::Disabled)?;

    let key_id = KeyId::new(params.key_id);
    let secret = source
        .redeem(&SaeId::from("simulator"), &target_sae, &key_id)
        .await?;

    Ok(Json(KeyContainer {
        keys: vec![KeyEntry {
            key_id: key_id.as_str().to_string(),
            key: STANDARD.encode(secret.as_slice()),
        }],
    }))
}
