//! ID-token validation.
//!
//! Every token from the code exchange is validated before anything is
//! persisted: signature against the provider key set, issuer, audience
//! (our client ID), nonce, and ACR membership when the authorization
//! request constrained it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Validation, decode_header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oidc::discovery::DiscoveryClient;
use crate::oidc::jwks::JwksCache;

/// Standard OIDC ID token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject identifier.
    pub sub: String,

    /// Audience (string or array on the wire).
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at time (Unix timestamp).
    pub iat: i64,

    /// Nonce value echoed from the authorization request.
    pub nonce: Option<String>,

    /// Time of authentication.
    pub auth_time: Option<i64>,

    /// Authentication context class reference.
    pub acr: Option<String>,

    /// Authentication methods references.
    pub amr: Option<Vec<String>>,

    /// Authorized party.
    pub azp: Option<String>,

    /// Extra claims not defined in the struct.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Custom deserializer for audience which can be a string or array.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(auds) => auds,
    })
}

/// Validates ID tokens against the provider key set and configuration.
pub struct IdTokenValidator {
    discovery: Arc<DiscoveryClient>,
    jwks: JwksCache,
    issuer: String,
    client_id: String,
    leeway: Duration,
}

impl IdTokenValidator {
    /// Creates a validator bound to one provider and client.
    #[must_use]
    pub fn new(
        discovery: Arc<DiscoveryClient>,
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        request_timeout: Duration,
        leeway: Duration,
        allow_http: bool,
    ) -> Self {
        Self {
            discovery,
            jwks: JwksCache::new(request_timeout, allow_http),
            issuer: issuer.into(),
            client_id: client_id.into(),
            leeway,
        }
    }

    /// Validates an ID token and returns its claims.
    ///
    /// Checks, in order: signature (key resolved by `kid` from the
    /// provider JWKS), issuer, audience containing our client ID, nonce
    /// (when one was sent), and ACR membership (when the request
    /// constrained `acr_values`).
    ///
    /// # Errors
    ///
    /// All failures are protocol errors and must never be auto-retried.
    pub async fn validate(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
        acr_values: Option<&[String]>,
    ) -> AuthResult<IdTokenClaims> {
        let header = decode_header(id_token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_id_token("missing key ID (kid) header"))?;

        let discovery = self.discovery.document().await?;
        let jwks_uri = Url::parse(&discovery.jwks_uri)
            .map_err(|e| AuthError::invalid_id_token(format!("invalid jwks_uri: {e}")))?;

        let (decoding_key, key_alg) = self.jwks.get_key(&jwks_uri, &kid).await?;

        // Prefer the key's declared algorithm over the header's
        let alg = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(alg);
        validation.set_audience(&[&self.client_id]);
        validation.set_issuer(&[self.issuer.trim_end_matches('/')]);
        validation.leeway = self.leeway.as_secs();

        let token_data = jsonwebtoken::decode::<IdTokenClaims>(id_token, &decoding_key, &validation)?;
        let claims = token_data.claims;

        if let Some(expected) = expected_nonce {
            match claims.nonce.as_deref() {
                Some(actual) if actual == expected => {}
                // Nonce is required when we sent one in the auth request
                _ => return Err(AuthError::NonceMismatch),
            }
        }

        if let Some(values) = acr_values {
            let satisfied = claims
                .acr
                .as_deref()
                .is_some_and(|acr| values.iter().any(|v| v == acr));
            if !satisfied {
                return Err(AuthError::AcrMismatch {
                    actual: claims.acr.clone(),
                });
            }
        }

        tracing::debug!(
            "Validated ID token for subject {} from issuer {}",
            claims.sub,
            claims.iss
        );

        Ok(claims)
    }

    /// Validates a signed userinfo JWT and returns its claim set.
    ///
    /// Userinfo JWTs are validated for signature and issuer only; the
    /// audience claim is optional per OIDC Core 5.3.2.
    pub async fn validate_userinfo_jwt(&self, jwt: &str) -> AuthResult<serde_json::Value> {
        let header = decode_header(jwt)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_id_token("missing key ID (kid) header"))?;

        let discovery = self.discovery.document().await?;
        let jwks_uri = Url::parse(&discovery.jwks_uri)
            .map_err(|e| AuthError::invalid_id_token(format!("invalid jwks_uri: {e}")))?;

        let (decoding_key, key_alg) = self.jwks.get_key(&jwks_uri, &kid).await?;
        let alg = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(alg);
        validation.set_issuer(&[self.issuer.trim_end_matches('/')]);
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = self.leeway.as_secs();

        let token_data = jsonwebtoken::decode::<serde_json::Value>(jwt, &decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

/// Decodes a JWT's claim set without verifying the signature.
///
/// Only valid for tokens received directly over the TLS channel to the
/// provider (token and challenge endpoint responses), where transport
/// authentication already vouches for origin. Never use this for tokens
/// that arrived via a redirect.
pub(crate) fn decode_claims_unverified(jwt: &str) -> AuthResult<serde_json::Value> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::invalid_id_token("not a compact JWT"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::invalid_id_token(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_id_token(format!("payload is not JSON: {e}")))
}
