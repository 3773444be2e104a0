//! Provider JWKS fetching and caching.
//!
//! ID tokens (and signed userinfo responses) are validated against the
//! provider's published key set. The cache is keyed by the JWKS URI and
//! refreshed on expiry or on a miss for an unknown `kid`.
//!
//! # Security Considerations
//!
//! - Only HTTPS JWKS URIs are allowed (configurable for testing)
//! - Response size is bounded
//! - The TTL is fixed; a malicious provider cannot extend it

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

/// Errors that can occur during JWKS operations.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be parsed as JSON.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// The requested key was not found in the JWKS.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The JWKS URI scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

/// Cached JWKS entry with its expiry.
struct CachedJwks {
    jwks: JwkSet,
    expires_at: Instant,
}

/// In-memory cache of the provider's key set.
pub struct JwksCache {
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedJwks>>>,
    ttl: Duration,
    max_response_size: usize,
    allow_http: bool,
}

impl JwksCache {
    /// Default cache TTL (1 hour).
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    /// Default maximum JWKS response size (1 MB).
    pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

    /// Creates a JWKS cache.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(request_timeout: Duration, allow_http: bool) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl: Self::DEFAULT_TTL,
            max_response_size: Self::DEFAULT_MAX_RESPONSE_SIZE,
            allow_http,
        }
    }

    /// Gets a decoding key by key ID from a JWKS endpoint.
    ///
    /// Checks the cache first; on a miss or expiry, fetches a fresh key
    /// set and retries the lookup once.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWKS cannot be fetched or the key is not
    /// present even after a refresh.
    pub async fn get_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Result<(DecodingKey, Option<Algorithm>), JwksError> {
        if let Some(result) = self.get_cached_key(jwks_uri, kid).await {
            tracing::trace!("Cache hit for JWKS key {} from {}", kid, jwks_uri);
            return Ok(result);
        }

        tracing::debug!("Cache miss for JWKS key {} from {}", kid, jwks_uri);
        self.refresh(jwks_uri).await?;

        self.get_cached_key(jwks_uri, kid)
            .await
            .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))
    }

    async fn get_cached_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Option<(DecodingKey, Option<Algorithm>)> {
        let cache = self.cache.read().await;

        cache.get(jwks_uri.as_str()).and_then(|cached| {
            if Instant::now() >= cached.expires_at {
                return None;
            }

            cached
                .jwks
                .keys
                .iter()
                .find(|k| k.common.key_id.as_deref() == Some(kid))
                .and_then(|jwk| {
                    DecodingKey::from_jwk(jwk)
                        .ok()
                        .map(|dk| (dk, jwk_algorithm(jwk)))
                })
        })
    }

    /// Fetches the key set and replaces the cache entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI scheme is not allowed, the request
    /// fails, or the body cannot be parsed as a JWK set.
    pub async fn refresh(&self, jwks_uri: &Url) -> Result<(), JwksError> {
        if jwks_uri.scheme() != "https" && !self.allow_http {
            return Err(JwksError::InvalidScheme);
        }

        tracing::debug!("Fetching JWKS from {}", jwks_uri);

        let response = self
            .http_client
            .get(jwks_uri.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch JWKS from {}: {}", jwks_uri, e);
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;

        if body.len() > self.max_response_size {
            return Err(JwksError::ResponseTooLarge {
                max_size: self.max_response_size,
            });
        }

        let jwks: JwkSet =
            serde_json::from_str(&body).map_err(|e| JwksError::ParseError(e.to_string()))?;

        let mut cache = self.cache.write().await;
        cache.insert(
            jwks_uri.as_str().to_string(),
            CachedJwks {
                jwks,
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(())
    }
}

/// Extracts the algorithm a JWK declares for itself, if any.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common
        .key_algorithm
        .and_then(|alg| alg.to_string().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_scheme_rejected_unless_allowed() {
        let cache = JwksCache::new(Duration::from_secs(1), false);
        let uri = Url::parse("http://auth.example.com/jwks").unwrap();
        let err = cache.refresh(&uri).await.unwrap_err();
        assert!(matches!(err, JwksError::InvalidScheme));
    }

    #[test]
    fn test_jwks_parse() {
        // RSA public key in JWK form (truncated modulus is still valid base64url)
        let json = r#"{
            "keys": [{
                "kty": "RSA",
                "kid": "key-1",
                "use": "sig",
                "alg": "RS256",
                "n": "sXchZvVdaLvQqKvGUUvbpLMbuLXwIwregZMGRtDoMaEwWVSMkFCFMfiFkRXDGyULqhgLXNqFQYJbLYfZ9cScSzd8qdM5cqM3vDRHs7UJxGDtbnlXG_gKlgkQ4uk77796RQ4yRzJG3QgEXNkHVE-yHBwhHgaQm-0GZywqko-kss0",
                "e": "AQAB"
            }]
        }"#;
        let jwks: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].common.key_id.as_deref(), Some("key-1"));
        assert!(jwk_algorithm(&jwks.keys[0]).is_some());
    }
}
