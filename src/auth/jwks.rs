//! Signing-key-set (JWKS) client with a time-boxed cache.
//!
//! The key set is fetched from the identity provider's published endpoint
//! and cached for a fixed TTL. A lookup for an unknown key id triggers one
//! refresh before failing, so provider key rotation is picked up without a
//! process restart.

use super::verifier::AuthError;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct JwksCache {
    url: String,
    ttl: Duration,
    http: reqwest::Client,
    cached: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    pub fn new(url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            url: url.into(),
            ttl,
            http: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Resolve the decoding key for a key id.
    ///
    /// Serves from cache while fresh; refetches when stale or when the key
    /// id is not present (rotation). A key id the provider does not publish
    /// even after a refresh is rejected.
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    if let Some(jwk) = entry.keys.find(kid) {
                        return DecodingKey::from_jwk(jwk)
                            .map_err(|_| AuthError::JwksUnavailable);
                    }
                    // fall through: fresh cache but unknown kid → refresh once
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another request may have refreshed while we waited for the lock.
        let needs_fetch = match cached.as_ref() {
            Some(entry) => {
                entry.fetched_at.elapsed() >= self.ttl || entry.keys.find(kid).is_none()
            }
            None => true,
        };
        if needs_fetch {
            let keys = self.fetch().await?;
            *cached = Some(CachedKeys {
                keys,
                fetched_at: Instant::now(),
            });
        }

        let entry = cached.as_ref().ok_or(AuthError::UnknownKey)?;
        let jwk = entry.keys.find(kid).ok_or(AuthError::UnknownKey)?;
        DecodingKey::from_jwk(jwk).map_err(|_| AuthError::JwksUnavailable)
    }

    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        tracing::debug!("Fetching JWKS from {}", self.url);
        let response = self
            .http
            .get(&self.url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("JWKS fetch failed: {e}");
                AuthError::JwksUnavailable
            })?;

        if !response.status().is_success() {
            tracing::error!("JWKS endpoint returned {}", response.status());
            return Err(AuthError::JwksUnavailable);
        }

        response.json::<JwkSet>().await.map_err(|e| {
            tracing::error!("JWKS parse failed: {e}");
            AuthError::JwksUnavailable
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
