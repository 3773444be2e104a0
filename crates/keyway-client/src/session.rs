//! The session facade.
//!
//! [`AuthSession`] wires configuration, storage, the provider gateway, the
//! token ledger, the authorization flow, and at most one live RBA
//! transaction into a single entry point for hosts.

use std::sync::Arc;

use url::Url;

use crate::AuthResult;
use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::gateway::{HttpGateway, IdentityProviderGateway, UserInfoPayload};
use crate::oidc::discovery::DiscoveryClient;
use crate::oidc::flow::{
    AuthorizationFlowController, AuthorizeOptions, AuthorizeRequest,
};
use crate::oidc::validation::{IdTokenClaims, IdTokenValidator};
use crate::platform::{Navigator, PopupDriver, WebAuthnDriver};
use crate::rba::payload::{ChallengeParameters, ChallengePayload, ChallengeResponse, ChallengeSubmission};
use crate::rba::transaction::{AuthenticationTransaction, TransactionOutcome, TransactionState};
use crate::store::CredentialStore;
use crate::token::ledger::TokenLedger;
use crate::token::record::IdentityTokenRecord;

/// One authenticated session against one provider and client.
///
/// The session holds at most one live RBA transaction; requesting a new
/// challenge replaces the old transaction, leaving the prior server-side
/// resource to expire on its own.
pub struct AuthSession {
    config: Arc<ClientConfig>,
    gateway: Arc<dyn IdentityProviderGateway>,
    ledger: Arc<TokenLedger>,
    flow: AuthorizationFlowController,
    validator: Arc<IdTokenValidator>,
    transaction: Option<AuthenticationTransaction>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Creates a session speaking HTTP to the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the configuration is
    /// invalid.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> AuthResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let discovery = Arc::new(DiscoveryClient::new(
            config.issuer.clone(),
            config.request_timeout,
            config.allow_http,
        ));
        let gateway: Arc<dyn IdentityProviderGateway> =
            Arc::new(HttpGateway::new(Arc::clone(&config), Arc::clone(&discovery)));

        Self::assemble(config, store, gateway, discovery)
    }

    /// Creates a session over a caller-supplied gateway.
    ///
    /// The gateway substitutes for all provider traffic except discovery
    /// and key-set fetches, which still go through HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the configuration is
    /// invalid.
    pub fn with_gateway(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        gateway: Arc<dyn IdentityProviderGateway>,
    ) -> AuthResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let discovery = Arc::new(DiscoveryClient::new(
            config.issuer.clone(),
            config.request_timeout,
            config.allow_http,
        ));

        Self::assemble(config, store, gateway, discovery)
    }

    fn assemble(
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
        gateway: Arc<dyn IdentityProviderGateway>,
        discovery: Arc<DiscoveryClient>,
    ) -> AuthResult<Self> {
        let validator = Arc::new(IdTokenValidator::new(
            Arc::clone(&discovery),
            config.issuer_str(),
            config.client_id.clone(),
            config.request_timeout,
            config.clock_skew_tolerance,
            config.allow_http,
        ));
        let ledger = Arc::new(TokenLedger::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            config.expiry_buffer,
        ));
        let flow = AuthorizationFlowController::new(
            Arc::clone(&config),
            store,
            Arc::clone(&gateway),
            discovery,
            Arc::clone(&validator),
            Arc::clone(&ledger),
        );

        Ok(Self {
            config,
            gateway,
            ledger,
            flow,
            validator,
            transaction: None,
        })
    }

    /// Attaches a navigator for address-bar control in redirect flows.
    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.flow = self.flow.with_navigator(navigator);
        self
    }

    /// The configuration this session was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The token ledger backing this session.
    #[must_use]
    pub fn ledger(&self) -> &Arc<TokenLedger> {
        &self.ledger
    }

    // Authorization code flow ------------------------------------------

    /// Composes an authorization URL for a redirect flow.
    pub async fn begin_authorization(
        &self,
        options: &AuthorizeOptions,
    ) -> AuthResult<AuthorizeRequest> {
        self.flow.begin_authorization(options).await
    }

    /// Runs the authorization flow through a popup.
    pub async fn authorize_with_popup(
        &self,
        options: &AuthorizeOptions,
        popup: &dyn PopupDriver,
    ) -> AuthResult<IdTokenClaims> {
        self.flow.authorize_with_popup(options, popup).await
    }

    /// Consumes a redirect callback and completes the code exchange.
    pub async fn handle_callback(&self, redirect_url: &Url) -> AuthResult<IdTokenClaims> {
        self.flow.handle_callback(redirect_url).await
    }

    /// Clears the local session; returns the provider end-session URL when
    /// one should be visited.
    pub async fn logout(&mut self) -> AuthResult<Option<Url>> {
        self.transaction = None;
        self.flow.logout().await
    }

    // Tokens -----------------------------------------------------------

    /// Returns an access token satisfying the given constraints,
    /// refreshing a stale record when needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoMatchingToken`] when no stored record
    /// satisfies the request.
    pub async fn get_access_token(
        &self,
        scopes: &[&str],
        audience: Option<&str>,
        acr_values: Option<&[&str]>,
    ) -> AuthResult<String> {
        self.ledger
            .select_access_token(scopes, audience, acr_values)
            .await
    }

    /// The stored identity token, if a session is active.
    pub async fn identity_token(&self) -> AuthResult<Option<IdentityTokenRecord>> {
        self.ledger.identity_token().await
    }

    /// Fetches userinfo claims for an access token.
    ///
    /// A signed (`application/jwt`) response is validated against the
    /// provider key set before its claims are returned.
    pub async fn fetch_userinfo(&self, access_token: &str) -> AuthResult<serde_json::Value> {
        match self.gateway.fetch_userinfo(access_token).await? {
            UserInfoPayload::Json(claims) => Ok(claims),
            UserInfoPayload::Jwt(jwt) => self.validator.validate_userinfo_jwt(&jwt).await,
        }
    }

    // RBA transactions -------------------------------------------------

    /// State of the live transaction, if any.
    #[must_use]
    pub fn transaction_state(&self) -> Option<TransactionState> {
        self.transaction.as_ref().map(AuthenticationTransaction::state)
    }

    /// The pending challenge payload of the live transaction, if any.
    #[must_use]
    pub fn challenge_payload(&self) -> Option<&ChallengePayload> {
        self.transaction.as_ref().and_then(AuthenticationTransaction::payload)
    }

    /// Requests an authentication challenge, starting a new transaction.
    ///
    /// A still-live prior transaction is replaced; its server-side
    /// resource is left to expire on its own.
    pub async fn request_challenge(
        &mut self,
        parameters: &ChallengeParameters,
    ) -> AuthResult<ChallengeResponse> {
        if let Some(prior) = &self.transaction
            && !prior.state().is_terminal()
        {
            tracing::warn!(
                "Replacing live transaction {} in state {}",
                prior.transaction_id().unwrap_or("<none>"),
                prior.state()
            );
        }

        let mut transaction =
            AuthenticationTransaction::new(Arc::clone(&self.gateway), Arc::clone(&self.ledger));
        let response = transaction.request_challenge(parameters).await?;
        self.transaction = Some(transaction);
        Ok(response)
    }

    /// Submits a response for the live transaction.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoActiveTransaction`] when no transaction is
    /// live.
    pub async fn submit_challenge(
        &mut self,
        submission: &ChallengeSubmission,
    ) -> AuthResult<TransactionOutcome> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(AuthError::NoActiveTransaction)?;
        let outcome = transaction.submit_challenge(submission).await?;
        if outcome.is_completed() {
            self.transaction = None;
        }
        Ok(outcome)
    }

    /// Completes a WebAuthn challenge through a platform authenticator.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WebAuthnUnsupported`] when the platform has no
    /// authenticator, and [`AuthError::InvalidSubmission`] when the live
    /// challenge is not a WebAuthn challenge.
    pub async fn submit_webauthn_assertion(
        &mut self,
        driver: &dyn WebAuthnDriver,
    ) -> AuthResult<TransactionOutcome> {
        if !driver.is_supported() {
            return Err(AuthError::WebAuthnUnsupported);
        }

        let options = match self.challenge_payload() {
            Some(ChallengePayload::WebAuthn { assertion_options }) => assertion_options.clone(),
            _ => {
                return Err(AuthError::invalid_submission(
                    "live challenge is not a WebAuthn challenge",
                ));
            }
        };

        let assertion = driver.get_assertion(&options).await?;
        self.submit_challenge(&ChallengeSubmission::WebAuthn { assertion })
            .await
    }

    /// Polls the live transaction once.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoActiveTransaction`] when no transaction is
    /// live.
    pub async fn poll_for_completion(&mut self) -> AuthResult<TransactionOutcome> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(AuthError::NoActiveTransaction)?;
        let outcome = transaction.poll_for_completion().await?;
        if outcome.is_completed() {
            self.transaction = None;
        }
        Ok(outcome)
    }

    /// Cancels and discards the live transaction.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoActiveTransaction`] when no transaction is
    /// live.
    pub async fn cancel_transaction(&mut self) -> AuthResult<()> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(AuthError::NoActiveTransaction)?;
        let result = transaction.cancel().await;
        self.transaction = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::memory::MemoryCredentialStore;

    fn config() -> ClientConfig {
        ClientConfig::new(
            Url::parse("https://auth.example.com").unwrap(),
            "client-1",
            Url::parse("https://app.example.com/callback").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let mut config = config();
        config.client_id = String::new();
        let err =
            AuthSession::new(config, Arc::new(MemoryCredentialStore::new())).unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_transaction_operations_require_a_live_transaction() {
        let mut session =
            AuthSession::new(config(), Arc::new(MemoryCredentialStore::new())).unwrap();

        assert!(session.transaction_state().is_none());
        assert!(matches!(
            session.poll_for_completion().await.unwrap_err(),
            AuthError::NoActiveTransaction
        ));
        assert!(matches!(
            session.cancel_transaction().await.unwrap_err(),
            AuthError::NoActiveTransaction
        ));
        assert!(matches!(
            session
                .submit_challenge(&ChallengeSubmission::Response {
                    response: "x".to_string(),
                })
                .await
                .unwrap_err(),
            AuthError::NoActiveTransaction
        ));
    }
}
