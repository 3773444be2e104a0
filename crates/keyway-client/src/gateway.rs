//! Identity-provider gateway: the network boundary of the engine.
//!
//! [`IdentityProviderGateway`] is the contract the token ledger, the
//! authorization flow, and the RBA transaction depend on. [`HttpGateway`]
//! is the production implementation; tests substitute their own.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthResult;
use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::oidc::discovery::DiscoveryClient;
use crate::rba::payload::{ChallengeParameters, ChallengeResponse, ChallengeSubmission};

/// A token-endpoint response (RFC 6749 Section 5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer access token.
    pub access_token: String,

    /// The token type (usually "Bearer").
    pub token_type: String,

    /// Token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Refresh token, when `offline_access` was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token (JWT), present on authentication responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scope, when it differs from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Parameters for an `authorization_code` grant.
#[derive(Debug, Clone)]
pub struct CodeExchangeRequest {
    /// The authorization code from the callback.
    pub code: String,
    /// The PKCE verifier generated with the authorization request.
    pub code_verifier: String,
    /// The redirect URI the code was issued for.
    pub redirect_uri: Url,
}

/// Result of submitting a challenge response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    /// Whether authentication completed on this submission.
    pub completed: bool,

    /// Whether the caller must now poll for completion (e.g. a password
    /// submission that triggered a push).
    #[serde(default)]
    pub poll_for_completion: bool,

    /// Tokens, present iff `completed` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenResponse>,
}

/// Result of one poll of a pending transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    /// Whether the out-of-band step has completed.
    pub completed: bool,

    /// Tokens, present iff `completed` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenResponse>,
}

/// A userinfo response, either plain claims or a signed JWT that the
/// caller must validate against the provider key set.
#[derive(Debug, Clone)]
pub enum UserInfoPayload {
    /// Plain JSON claims.
    Json(serde_json::Value),
    /// A signed JWT (`application/jwt` response).
    Jwt(String),
}

/// Network contract with the identity provider.
///
/// One server-tracked transaction resource backs the four challenge
/// operations. Implementations surface transport failures verbatim and
/// never retry; retry policy belongs to callers.
#[async_trait]
pub trait IdentityProviderGateway: Send + Sync {
    /// Exchanges an authorization code (plus PKCE verifier) for tokens.
    ///
    /// # Errors
    ///
    /// Returns a provider error for OAuth error responses and a network
    /// error for transport failures.
    async fn exchange_code(&self, request: &CodeExchangeRequest) -> AuthResult<TokenResponse>;

    /// Performs a `refresh_token` grant.
    ///
    /// # Errors
    ///
    /// Returns a provider error for OAuth error responses (e.g. a revoked
    /// refresh token) and a network error for transport failures.
    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResponse>;

    /// Creates a new challenge transaction.
    async fn request_challenge(
        &self,
        parameters: &ChallengeParameters,
    ) -> AuthResult<ChallengeResponse>;

    /// Submits a challenge response for a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TransactionExpired`] when the server no longer
    /// tracks the transaction.
    async fn submit_challenge(
        &self,
        transaction_id: &str,
        submission: &ChallengeSubmission,
    ) -> AuthResult<SubmissionOutcome>;

    /// Polls a pending transaction once.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TransactionExpired`] when the server no longer
    /// tracks the transaction; transport errors surface verbatim so the
    /// caller can apply its own retry policy.
    async fn poll_transaction(&self, transaction_id: &str) -> AuthResult<PollOutcome>;

    /// Cancels a transaction server-side (best effort).
    async fn cancel_transaction(&self, transaction_id: &str) -> AuthResult<()>;

    /// Fetches userinfo claims with a bearer token.
    async fn fetch_userinfo(&self, access_token: &str) -> AuthResult<UserInfoPayload>;
}

/// OAuth error response body.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Production gateway speaking HTTP to the provider.
///
/// Token and userinfo endpoints are resolved from discovery; the challenge
/// endpoint comes from configuration (or its issuer-derived default).
pub struct HttpGateway {
    http_client: reqwest::Client,
    config: Arc<ClientConfig>,
    discovery: Arc<DiscoveryClient>,
}

impl HttpGateway {
    /// Creates a gateway over the given discovery client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(config: Arc<ClientConfig>, discovery: Arc<DiscoveryClient>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            config,
            discovery,
        }
    }

    /// Posts a form to the token endpoint and parses the response.
    async fn token_grant(&self, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let discovery = self.discovery.document().await?;
        let token_endpoint = Url::parse(&discovery.token_endpoint)
            .map_err(|e| AuthError::internal(format!("Discovery returned invalid token endpoint: {e}")))?;

        tracing::debug!("Posting {} grant to {}", params[0].1, token_endpoint);

        let response = self
            .http_client
            .post(token_endpoint.as_str())
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::network(format!("Failed to parse token response: {e}")))?;

        Ok(tokens)
    }

    /// Maps a non-success HTTP response to an error, preferring the OAuth
    /// error body when one is present.
    async fn error_from_response(response: reqwest::Response) -> AuthError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
            return AuthError::provider(
                oauth_error.error,
                oauth_error.error_description.unwrap_or_default(),
            );
        }

        AuthError::network(format!("HTTP {status} - {body}"))
    }

    /// The challenge transaction URL for a given transaction id.
    fn transaction_url(&self, transaction_id: &str) -> AuthResult<Url> {
        let mut url = self.config.resolved_challenge_endpoint();
        url.path_segments_mut()
            .map_err(|()| AuthError::internal("challenge endpoint cannot be a base URL"))?
            .push(transaction_id);
        Ok(url)
    }
}

#[async_trait]
impl IdentityProviderGateway for HttpGateway {
    async fn exchange_code(&self, request: &CodeExchangeRequest) -> AuthResult<TokenResponse> {
        self.token_grant(&[
            ("grant_type", "authorization_code"),
            ("code", &request.code),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", &self.config.client_id),
            ("code_verifier", &request.code_verifier),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        self.token_grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
        ])
        .await
    }

    async fn request_challenge(
        &self,
        parameters: &ChallengeParameters,
    ) -> AuthResult<ChallengeResponse> {
        let endpoint = self.config.resolved_challenge_endpoint();
        tracing::debug!("Requesting challenge from {}", endpoint);

        let response = self
            .http_client
            .post(endpoint.as_str())
            .json(parameters)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let challenge: ChallengeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::network(format!("Failed to parse challenge response: {e}")))?;

        Ok(challenge)
    }

    async fn submit_challenge(
        &self,
        transaction_id: &str,
        submission: &ChallengeSubmission,
    ) -> AuthResult<SubmissionOutcome> {
        let url = self.transaction_url(transaction_id)?;

        let response = self
            .http_client
            .post(url.as_str())
            .json(submission)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AuthError::transaction_expired(transaction_id));
        }
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let outcome: SubmissionOutcome = response
            .json()
            .await
            .map_err(|e| AuthError::network(format!("Failed to parse submission outcome: {e}")))?;

        Ok(outcome)
    }

    async fn poll_transaction(&self, transaction_id: &str) -> AuthResult<PollOutcome> {
        let url = self.transaction_url(transaction_id)?;

        let response = self.http_client.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AuthError::transaction_expired(transaction_id));
        }
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let outcome: PollOutcome = response
            .json()
            .await
            .map_err(|e| AuthError::network(format!("Failed to parse poll outcome: {e}")))?;

        Ok(outcome)
    }

    async fn cancel_transaction(&self, transaction_id: &str) -> AuthResult<()> {
        let url = self.transaction_url(transaction_id)?;

        let response = self.http_client.delete(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AuthError::transaction_expired(transaction_id));
        }
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        Ok(())
    }

    async fn fetch_userinfo(&self, access_token: &str) -> AuthResult<UserInfoPayload> {
        let discovery = self.discovery.document().await?;
        let endpoint = discovery
            .userinfo_endpoint
            .as_ref()
            .ok_or_else(|| AuthError::internal("Provider does not expose a userinfo endpoint"))?;

        let response = self
            .http_client
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("application/jwt") {
            let jwt = response.text().await?;
            return Ok(UserInfoPayload::Jwt(jwt));
        }

        let claims: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::network(format!("Failed to parse userinfo response: {e}")))?;

        Ok(UserInfoPayload::Json(claims))
    }
}
