use std::time::Instant;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder};
use url::Url;

use common::prelude::{AckResponse, ConfirmBody, RelationshipId};

use super::PeerApiError;
use crate::http_server::api::client::ApiRequest;
use crate::ServiceState;

/// CONFIRM: the initiator committed; finalize the parked round and publish
/// the released secret.
pub async fn handler(
    State(state): State<ServiceState>,
    Path(relationship_id): Path<RelationshipId>,
    Json(body): Json<ConfirmBody>,
) -> Result<impl IntoResponse, PeerApiError> {
    let handle = state
        .relationship(&relationship_id)
        .ok_or_else(|| PeerApiError::UnknownRelationship(relationship_id.clone()))?;

    let derived = handle
        .relationship
        .handle_confirm(body.generation, Instant::now())?;

    // The chain is committed either way; a sink failure is an operator
    // problem, not a protocol one, and must not desynchronize the peers.
    if let Err(err) = handle.sink.publish(&derived).await {
        tracing::error!(
            relationship = %relationship_id,
            generation = derived.generation,
            %err,
            "failed to publish rotated secret"
        );
    }

    Ok(Json(AckResponse::ok()))
}

// Client implementation - builds request for this operation
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub relationship_id: RelationshipId,
    pub generation: u64,
}

impl ApiRequest for ConfirmRequest {
    type Response = AckResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let path = format!("/api/v1/peer/{}/confirm", self.relationship_id);
        let full_url = base_url.join(&path).expect("peer route path is valid");
        client.post(full_url).json(&ConfirmBody {
            generation: self.generation,
        })
    }
}
