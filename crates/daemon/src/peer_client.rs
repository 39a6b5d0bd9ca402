//! HTTP peer transport.
//!
//! Bound to one relationship at construction; drives the request types
//! defined next to the peer endpoint handlers. Status classification is
//! what the exchange taxonomy needs: connection trouble and 5xx are
//! retryable transport failures, any 4xx is the peer refusing — a protocol
//! error for this round.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use common::prelude::{KeyId, PeerError, PeerTransport, RelationshipId, RequestKind};

use crate::http_server::api::client::{ApiClient, ApiError};
use crate::http_server::api::v1::peer::confirm::ConfirmRequest;
use crate::http_server::api::v1::peer::new::NewRequest;
use crate::http_server::api::v1::peer::rotate::RotateRequest;

#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: ApiClient,
    relationship_id: RelationshipId,
}

impl HttpPeerTransport {
    pub fn new(
        peer_url: &Url,
        relationship_id: RelationshipId,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(peer_url, timeout)?,
            relationship_id,
        })
    }
}

fn map_api_error(err: ApiError) -> PeerError {
    match err {
        ApiError::HttpStatus(status, body) if status.is_client_error() => {
            PeerError::Rejected(format!("{status}: {body}"))
        }
        ApiError::HttpStatus(status, body) => PeerError::Transport(format!("{status}: {body}")),
        ApiError::Reqwest(err) => PeerError::Transport(err.to_string()),
        ApiError::UrlParse(err) => PeerError::Transport(err.to_string()),
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn request_key(&self, kind: RequestKind) -> Result<KeyId, PeerError> {
        let response = match kind {
            RequestKind::New => {
                self.client
                    .call(NewRequest {
                        relationship_id: self.relationship_id.clone(),
                    })
                    .await
            }
            RequestKind::Rotate => {
                self.client
                    .call(RotateRequest {
                        relationship_id: self.relationship_id.clone(),
                    })
                    .await
            }
        }
        .map_err(map_api_error)?;

        Ok(KeyId::new(response.key_id))
    }

    async fn confirm(&self, generation: u64) -> Result<(), PeerError> {
        self.client
            .call(ConfirmRequest {
                relationship_id: self.relationship_id.clone(),
                generation,
            })
            .await
            .map_err(map_api_error)?;
        Ok(())
    }
}
