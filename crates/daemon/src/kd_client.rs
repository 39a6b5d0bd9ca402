//! HTTP client for an ETSI GS QKD 014 style key-delivery endpoint.
//!
//! Two GET routes: `enc_keys` mints a fresh key for a target entity,
//! `dec_keys` redeems a key the counterpart minted, by identifier. Either
//! way the key leaves the endpoint's store — a second redemption fails.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use url::Url;

use common::prelude::{KeyBytes, KeyId, KeyMaterial, KeySource, KeySourceError, SaeId};

use crate::http_server::api::v1::keys::KeyContainer;

#[derive(Debug, Clone)]
pub struct KdClient {
    base: Url,
    client: Client,
}

impl KdClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    fn route(&self, target: &SaeId, leaf: &str) -> Result<Url, KeySourceError> {
        self.base
            .join(&format!("/api/v1/keys/{}/{}", target, leaf))
            .map_err(|err| KeySourceError::Malformed(format!("bad key delivery url: {err}")))
    }

    async fn fetch_container(
        &self,
        request: reqwest::RequestBuilder,
        redeeming: Option<&KeyId>,
    ) -> Result<KeyMaterial, KeySourceError> {
        let response = request
            .send()
            .await
            .map_err(|err| KeySourceError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(match redeeming {
                    Some(key_id) => KeySourceError::NotFound(key_id.clone()),
                    None => KeySourceError::Transport("key delivery route not found".to_string()),
                });
            }
            StatusCode::SERVICE_UNAVAILABLE => return Err(KeySourceError::Exhausted),
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(KeySourceError::Transport(format!(
                    "key delivery returned {status}: {body}"
                )));
            }
        }

        let container: KeyContainer = response
            .json()
            .await
            .map_err(|err| KeySourceError::Malformed(err.to_string()))?;
        let entry = container
            .keys
            .into_iter()
            .next()
            .ok_or_else(|| KeySourceError::Malformed("empty key container".to_string()))?;
        let bytes = STANDARD
            .decode(entry.key.as_bytes())
            .map_err(|err| KeySourceError::Malformed(format!("bad key encoding: {err}")))?;

        Ok(KeyMaterial {
            key_id: KeyId::new(entry.key_id),
            secret: KeyBytes::new(bytes),
        })
    }
}

#[async_trait]
impl KeySource for KdClient {
    async fn mint(
        &self,
        _requester: &SaeId,
        target: &SaeId,
    ) -> Result<KeyMaterial, KeySourceError> {
        let url = self.route(target, "enc_keys")?;
        tracing::debug!(%url, "requesting fresh key material");
        let request = self.client.get(url).query(&[("number", "1")]);
        self.fetch_container(request, None).await
    }

    async fn redeem(
        &self,
        _requester: &SaeId,
        target: &SaeId,
        key_id: &KeyId,
    ) -> Result<KeyBytes, KeySourceError> {
        let url = self.route(target, "dec_keys")?;
        tracing::debug!(%url, %key_id, "redeeming key material by identifier");
        let request = self
            .client
            .get(url)
            .query(&[("key_ID", key_id.as_str())]);
        let material = self.fetch_container(request, Some(key_id)).await?;
        Ok(material.secret)
    }
}
