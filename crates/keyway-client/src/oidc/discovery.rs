//! OpenID Connect Discovery.
//!
//! Fetches provider metadata from `{issuer}/.well-known/openid-configuration`
//! and caches it for the life of the process: one fetch per client, on first
//! use.
//!
//! # Security Considerations
//!
//! - Only HTTPS issuer URLs are allowed (except in tests)
//! - The issuer claim in the document must match the configured issuer
//! - Response size is bounded
//!
//! # References
//!
//! - [OpenID Connect Discovery 1.0](https://openid.net/specs/openid-connect-discovery-1_0.html)
//! - [RFC 8414 - OAuth 2.0 Authorization Server Metadata](https://tools.ietf.org/html/rfc8414)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

/// Errors that can occur during discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A network error occurred while fetching the discovery document.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The discovery document could not be parsed as JSON.
    #[error("Failed to parse discovery document: {0}")]
    ParseError(String),

    /// The issuer in the document does not match the configured issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The configured issuer.
        expected: String,
        /// The issuer from the document.
        actual: String,
    },

    /// The issuer URL scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

/// Provider metadata from the `.well-known/openid-configuration` endpoint.
///
/// Trimmed to the fields this client consults; unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// URL that the provider asserts as its issuer identifier.
    pub issuer: String,

    /// URL of the authorization endpoint.
    pub authorization_endpoint: String,

    /// URL of the token endpoint.
    pub token_endpoint: String,

    /// URL of the provider's JSON Web Key Set document.
    pub jwks_uri: String,

    /// URL of the userinfo endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// URL the client redirects to for provider-side logout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// Supported OAuth 2.0 response types.
    pub response_types_supported: Vec<String>,

    /// Supported response modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modes_supported: Option<Vec<String>>,

    /// JWS signing algorithms supported for the ID token.
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// Supported authentication context class references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr_values_supported: Option<Vec<String>>,

    /// Supported PKCE code challenge methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Supported scope values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Supported grant types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,
}

impl DiscoveryDocument {
    /// Returns `true` if this provider supports the specified response mode.
    #[must_use]
    pub fn supports_response_mode(&self, mode: &str) -> bool {
        self.response_modes_supported
            .as_ref()
            .is_some_and(|modes| modes.iter().any(|m| m == mode))
    }

    /// Returns `true` if this provider supports PKCE with the specified
    /// method.
    #[must_use]
    pub fn supports_pkce_method(&self, method: &str) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == method))
    }

    /// Returns `true` if this provider advertises the specified ACR value.
    #[must_use]
    pub fn supports_acr_value(&self, acr: &str) -> bool {
        self.acr_values_supported
            .as_ref()
            .is_some_and(|values| values.iter().any(|v| v == acr))
    }
}

/// Fetch-once discovery client.
///
/// The first call to [`DiscoveryClient::document`] fetches and validates
/// the document; every later call serves the cached copy for the process
/// lifetime.
pub struct DiscoveryClient {
    http_client: reqwest::Client,
    issuer: Url,
    allow_http: bool,
    max_response_size: usize,
    cached: RwLock<Option<Arc<DiscoveryDocument>>>,
}

impl DiscoveryClient {
    /// Default maximum discovery response size (1 MB).
    pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

    /// Creates a discovery client for an issuer.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(issuer: Url, request_timeout: Duration, allow_http: bool) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            issuer,
            allow_http,
            max_response_size: Self::DEFAULT_MAX_RESPONSE_SIZE,
            cached: RwLock::new(None),
        }
    }

    /// Returns the discovery document, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is not HTTPS (unless HTTP is
    /// allowed), the document cannot be fetched or parsed, or the issuer
    /// in the document does not match.
    pub async fn document(&self) -> Result<Arc<DiscoveryDocument>, DiscoveryError> {
        {
            let cached = self.cached.read().await;
            if let Some(doc) = cached.as_ref() {
                return Ok(Arc::clone(doc));
            }
        }

        let doc = Arc::new(self.fetch().await?);

        let mut cached = self.cached.write().await;
        // A concurrent first fetch may have won; keep whichever landed
        if cached.is_none() {
            *cached = Some(Arc::clone(&doc));
        }
        Ok(cached.as_ref().map(Arc::clone).unwrap_or(doc))
    }

    /// Fetches and validates the discovery document.
    async fn fetch(&self) -> Result<DiscoveryDocument, DiscoveryError> {
        if self.issuer.scheme() != "https" && !self.allow_http {
            return Err(DiscoveryError::InvalidScheme(
                self.issuer.scheme().to_string(),
            ));
        }

        let discovery_url = self.discovery_url();
        tracing::debug!("Fetching OIDC discovery from {}", discovery_url);

        let response = self
            .http_client
            .get(discovery_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch OIDC discovery from {}: {}", self.issuer, e);
                DiscoveryError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::HttpError(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.max_response_size
        {
            return Err(DiscoveryError::ResponseTooLarge {
                max_size: self.max_response_size,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| DiscoveryError::NetworkError(e.to_string()))?;

        if body.len() > self.max_response_size {
            return Err(DiscoveryError::ResponseTooLarge {
                max_size: self.max_response_size,
            });
        }

        let doc: DiscoveryDocument =
            serde_json::from_str(&body).map_err(|e| DiscoveryError::ParseError(e.to_string()))?;

        let expected = self.issuer.as_str().trim_end_matches('/');
        let actual = doc.issuer.trim_end_matches('/');
        if expected != actual {
            return Err(DiscoveryError::IssuerMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        tracing::debug!("Discovery document cached for {}", expected);
        Ok(doc)
    }

    /// The well-known discovery URL for the configured issuer.
    #[must_use]
    pub fn discovery_url(&self) -> Url {
        let mut url = self.issuer.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .expect("issuer validated as a base URL");
            segments.pop_if_empty();
            segments.push(".well-known");
            segments.push("openid-configuration");
        }
        url
    }
}
