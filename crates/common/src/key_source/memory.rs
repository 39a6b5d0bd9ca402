//! In-memory single-use key source.
//!
//! Backs the simulated key-delivery API and tests. Every minted key is held
//! for exactly one redemption; an optional capacity bounds how many keys the
//! source will ever mint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::{KeyBytes, KeyId, KeyMaterial, KeySource, KeySourceError};
use crate::types::SaeId;

/// Number of bytes in each minted key.
pub const MINTED_KEY_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct MemoryKeySource {
    inner: Arc<Mutex<MemoryKeySourceInner>>,
}

#[derive(Debug)]
struct MemoryKeySourceInner {
    /// Keys the source may still mint; None = unbounded.
    remaining: Option<usize>,
    /// Minted, not yet redeemed: key id -> bytes. Redemption removes.
    outstanding: HashMap<KeyId, KeyBytes>,
    /// Total keys ever minted.
    minted_total: usize,
}

impl MemoryKeySource {
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// A source that mints at most `capacity` keys, then reports exhaustion.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    fn new(remaining: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryKeySourceInner {
                remaining,
                outstanding: HashMap::new(),
                minted_total: 0,
            })),
        }
    }

    /// Number of minted keys still awaiting redemption.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding.len()
    }

    /// Total keys minted so far.
    pub fn minted(&self) -> usize {
        self.lock().minted_total
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryKeySourceInner> {
        self.inner.lock().expect("key source state lock poisoned")
    }
}

#[async_trait]
impl KeySource for MemoryKeySource {
    async fn mint(
        &self,
        _requester: &SaeId,
        target: &SaeId,
    ) -> Result<KeyMaterial, KeySourceError> {
        let mut inner = self.lock();

        if let Some(remaining) = inner.remaining.as_mut() {
            if *remaining == 0 {
                return Err(KeySourceError::Exhausted);
            }
            *remaining -= 1;
        }

        let key_id = KeyId::new(Uuid::new_v4().to_string());
        let mut bytes = vec![0u8; MINTED_KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
        let secret = KeyBytes::new(bytes);

        tracing::trace!(key_id = %key_id, target = %target, "minted one-time key");
        inner.outstanding.insert(key_id.clone(), secret.clone());
        inner.minted_total += 1;

        Ok(KeyMaterial { key_id, secret })
    }

    async fn redeem(
        &self,
        _requester: &SaeId,
        _target: &SaeId,
        key_id: &KeyId,
    ) -> Result<KeyBytes, KeySourceError> {
        self.lock()
            .outstanding
            .remove(key_id)
            .ok_or_else(|| KeySourceError::NotFound(key_id.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sae(id: &str) -> SaeId {
        SaeId::from(id)
    }

    #[tokio::test]
    async fn test_minted_key_is_redeemable_exactly_once() {
        let source = MemoryKeySource::unbounded();
        let material = source.mint(&sae("a"), &sae("b")).await.unwrap();

        let redeemed = source
            .redeem(&sae("b"), &sae("a"), &material.key_id)
            .await
            .unwrap();
        assert_eq!(redeemed.as_slice(), material.secret.as_slice());

        let again = source.redeem(&sae("b"), &sae("a"), &material.key_id).await;
        assert!(matches!(again, Err(KeySourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_key_id_is_not_found() {
        let source = MemoryKeySource::unbounded();
        let result = source
            .redeem(&sae("b"), &sae("a"), &KeyId::new("no-such-key"))
            .await;
        assert!(matches!(result, Err(KeySourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_capacity_exhaustion() {
        let source = MemoryKeySource::with_capacity(2);
        source.mint(&sae("a"), &sae("b")).await.unwrap();
        source.mint(&sae("a"), &sae("b")).await.unwrap();

        let third = source.mint(&sae("a"), &sae("b")).await;
        assert!(matches!(third, Err(KeySourceError::Exhausted)));
        assert_eq!(source.minted(), 2);
        assert_eq!(source.outstanding(), 2);
    }

    #[tokio::test]
    async fn test_minted_keys_are_distinct() {
        let source = MemoryKeySource::unbounded();
        let first = source.mint(&sae("a"), &sae("b")).await.unwrap();
        let second = source.mint(&sae("a"), &sae("b")).await.unwrap();

        assert_ne!(first.key_id, second.key_id);
        assert_ne!(first.secret.as_slice(), second.secret.as_slice());
        assert_eq!(first.secret.len(), MINTED_KEY_SIZE);
    }
}
