use std::time::Instant;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder};
use url::Url;

use common::prelude::{KeyIdResponse, RelationshipId, RequestKind};

use super::PeerApiError;
use crate::http_server::api::client::ApiRequest;
use crate::ServiceState;

/// REQUEST_NEW: the initiator has no committed generation; start the chain
/// from its genesis secret.
pub async fn handler(
    State(state): State<ServiceState>,
    Path(relationship_id): Path<RelationshipId>,
) -> Result<impl IntoResponse, PeerApiError> {
    let handle = state
        .relationship(&relationship_id)
        .ok_or_else(|| PeerApiError::UnknownRelationship(relationship_id.clone()))?;

    let key_id = handle
        .relationship
        .handle_request(RequestKind::New, Instant::now())
        .await?;

    Ok(Json(KeyIdResponse::ok(&key_id)))
}

// Client implementation - builds request for this operation
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub relationship_id: RelationshipId,
}

impl ApiRequest for NewRequest {
    type Response = KeyIdResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let path = format!("/api/v1/peer/{}/new", self.relationship_id);
        let full_url = base_url.join(&path).expect("peer route path is valid");
        client.post(full_url)
    }
}
