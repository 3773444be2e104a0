//! Authorization code flow with PKCE.
//!
//! [`AuthorizationFlowController`] drives the full round-trip: it composes
//! the authorization URL, persists the one-shot flow state, consumes the
//! callback, exchanges the code, validates the ID token, and hands the
//! resulting tokens to the ledger.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::AuthResult;
use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::gateway::{CodeExchangeRequest, IdentityProviderGateway};
use crate::oidc::discovery::{DiscoveryClient, DiscoveryDocument};
use crate::oidc::validation::{IdTokenClaims, IdTokenValidator};
use crate::pkce::{FlowMaterial, PkceVerifier};
use crate::platform::{Navigator, PopupDriver};
use crate::store::{CredentialStore, FLOW_STATE_KEY};
use crate::token::ledger::TokenLedger;
use crate::token::record::IdentityTokenRecord;

/// Response mode used for popup-based authorization.
pub const WEB_MESSAGE_RESPONSE_MODE: &str = "web_message";

/// Composes the scope string for an authorization request.
///
/// Preserves the caller's order, guarantees `openid` is present, appends
/// `offline_access` when a refresh token is wanted, and drops duplicates.
#[must_use]
pub fn compose_scope(scopes: &[String], offline_access: bool) -> String {
    let mut seen: Vec<&str> = Vec::with_capacity(scopes.len() + 2);

    for scope in scopes {
        let scope = scope.trim();
        if !scope.is_empty() && !seen.contains(&scope) {
            seen.push(scope);
        }
    }
    if !seen.contains(&"openid") {
        seen.push("openid");
    }
    if offline_access && !seen.contains(&"offline_access") {
        seen.push("offline_access");
    }

    seen.join(" ")
}

/// Caller-supplied options for one authorization round-trip.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    /// Scopes to request (in addition to `openid`, which is always sent).
    pub scopes: Vec<String>,

    /// Target audience (resource server) for the access token.
    pub audience: Option<String>,

    /// Acceptable authentication context class references, strongest first.
    pub acr_values: Option<Vec<String>>,

    /// Maximum acceptable age of the authentication, in seconds.
    pub max_age: Option<u64>,

    /// Whether to request a refresh token (`offline_access` scope).
    pub offline_access: bool,

    /// Hint to pre-fill the provider's login form.
    pub login_hint: Option<String>,

    /// OIDC `prompt` parameter (e.g. `login`, `none`).
    pub prompt: Option<String>,
}

/// A prepared authorization request: the URL to send the user to and the
/// state it is bound to.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// The fully composed authorization URL.
    pub url: Url,
    /// The state parameter embedded in the URL.
    pub state: String,
}

/// Parameters extracted from an authorization callback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    /// The authorization code, on success.
    pub code: Option<String>,
    /// The echoed state parameter.
    pub state: Option<String>,
    /// The OAuth error code, on failure.
    pub error: Option<String>,
    /// Human-readable error description.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extracts callback parameters from a redirect URL's query string.
    #[must_use]
    pub fn from_redirect_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Persisted flow state for a pending authorization round-trip.
///
/// Written when the authorization URL is composed and consumed (deleted)
/// by the first callback whose state matches. The verifier never appears
/// in any URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFlowState {
    /// CSRF-binding state parameter.
    pub state: String,

    /// Nonce the ID token must echo.
    pub nonce: String,

    /// PKCE verifier for the code exchange.
    pub verifier: PkceVerifier,

    /// Redirect URI the request was issued with.
    pub redirect_uri: Url,

    /// Scopes that were requested.
    pub scopes: Vec<String>,

    /// Audience the access token was requested for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// ACR values the authorization was constrained to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr_values: Option<Vec<String>>,

    /// Requested `max_age`, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,

    /// When the authorization was initiated.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

/// Drives the authorization code flow end to end.
pub struct AuthorizationFlowController {
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
    gateway: Arc<dyn IdentityProviderGateway>,
    discovery: Arc<DiscoveryClient>,
    validator: Arc<IdTokenValidator>,
    ledger: Arc<TokenLedger>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl AuthorizationFlowController {
    /// Creates a flow controller over the given collaborators.
    #[must_use]
    pub fn new(
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
        gateway: Arc<dyn IdentityProviderGateway>,
        discovery: Arc<DiscoveryClient>,
        validator: Arc<IdTokenValidator>,
        ledger: Arc<TokenLedger>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            discovery,
            validator,
            ledger,
            navigator: None,
        }
    }

    /// Attaches a navigator so callback parameters are stripped from the
    /// address bar before the code exchange.
    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Composes an authorization URL and persists the flow state.
    ///
    /// The returned URL carries the PKCE challenge (S256), state, and
    /// nonce; the verifier stays in the credential store until the code
    /// exchange.
    ///
    /// # Errors
    ///
    /// Fails on discovery or storage errors.
    pub async fn begin_authorization(
        &self,
        options: &AuthorizeOptions,
    ) -> AuthResult<AuthorizeRequest> {
        self.begin_with_response_mode(options, None).await
    }

    async fn begin_with_response_mode(
        &self,
        options: &AuthorizeOptions,
        response_mode: Option<&str>,
    ) -> AuthResult<AuthorizeRequest> {
        let discovery = self.discovery.document().await?;
        let material = FlowMaterial::generate();

        let url = build_authorize_url(&discovery, &self.config, &material, options, response_mode)?;

        let flow_state = ClientFlowState {
            state: material.state.clone(),
            nonce: material.nonce,
            verifier: material.verifier,
            redirect_uri: self.config.redirect_uri.clone(),
            scopes: options.scopes.clone(),
            audience: options.audience.clone(),
            acr_values: options.acr_values.clone(),
            max_age: options.max_age,
            created_at: OffsetDateTime::now_utc(),
        };
        let serialized = serde_json::to_string(&flow_state)
            .map_err(|e| AuthError::internal(format!("Failed to serialize flow state: {e}")))?;
        self.store.save(FLOW_STATE_KEY, &serialized).await?;

        tracing::debug!("Authorization flow initiated with state {}", material.state);

        Ok(AuthorizeRequest {
            url,
            state: material.state,
        })
    }

    /// Runs the flow through a popup using the `web_message` response mode.
    ///
    /// The popup path persists and consumes the same one-shot flow state
    /// as the redirect path; only the callback delivery differs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedResponseMode`] when the provider
    /// does not advertise `web_message`, and [`AuthError::PopupBlocked`]
    /// when the host refuses to open the window.
    pub async fn authorize_with_popup(
        &self,
        options: &AuthorizeOptions,
        popup: &dyn PopupDriver,
    ) -> AuthResult<IdTokenClaims> {
        let discovery = self.discovery.document().await?;
        if !discovery.supports_response_mode(WEB_MESSAGE_RESPONSE_MODE) {
            return Err(AuthError::UnsupportedResponseMode {
                response_mode: WEB_MESSAGE_RESPONSE_MODE.to_string(),
            });
        }

        let request = self
            .begin_with_response_mode(options, Some(WEB_MESSAGE_RESPONSE_MODE))
            .await?;

        let params = popup
            .open_and_await_callback(&request.url, &request.state)
            .await?;

        self.complete_authorization(&params).await
    }

    /// Consumes a redirect callback: validates state, exchanges the code,
    /// validates the ID token, and persists the resulting records.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoPendingAuthorization`] when no flow state is
    /// stored, [`AuthError::StateMismatch`] when the echoed state differs,
    /// [`AuthError::Provider`] when the provider returned an error, and
    /// [`AuthError::InvalidCallback`] when neither code nor error is
    /// present.
    pub async fn handle_callback(&self, redirect_url: &Url) -> AuthResult<IdTokenClaims> {
        let params = CallbackParams::from_redirect_url(redirect_url);

        // Strip the one-time parameters from the address bar before any
        // network round-trip
        if let Some(navigator) = &self.navigator {
            let mut clean = redirect_url.clone();
            clean.set_query(None);
            clean.set_fragment(None);
            navigator.replace_url(&clean).await?;
        }

        self.complete_authorization(&params).await
    }

    /// Shared tail of the redirect and popup paths.
    async fn complete_authorization(&self, params: &CallbackParams) -> AuthResult<IdTokenClaims> {
        let flow_state = self.take_flow_state(params).await?;

        if let Some(error) = &params.error {
            return Err(AuthError::provider(
                error.clone(),
                params.error_description.clone().unwrap_or_default(),
            ));
        }

        let code = params.code.as_ref().ok_or(AuthError::InvalidCallback)?;

        let tokens = self
            .gateway
            .exchange_code(&CodeExchangeRequest {
                code: code.clone(),
                code_verifier: flow_state.verifier.as_str().to_string(),
                redirect_uri: flow_state.redirect_uri.clone(),
            })
            .await?;

        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_id_token("token response carried no ID token"))?;

        let claims = self
            .validator
            .validate(
                id_token,
                Some(&flow_state.nonce),
                flow_state.acr_values.as_deref(),
            )
            .await?;

        let claims_value = serde_json::to_value(&claims)
            .map_err(|e| AuthError::internal(format!("Failed to serialize claims: {e}")))?;
        self.ledger
            .store_identity_token(&IdentityTokenRecord {
                encoded: id_token.to_string(),
                claims: claims_value,
            })
            .await?;

        let max_age_expiry = flow_state.max_age.map(max_age_ceiling);
        self.ledger
            .store_token_response(
                &tokens,
                &flow_state.scopes,
                flow_state.audience.as_deref(),
                claims.acr.as_deref(),
                max_age_expiry,
            )
            .await?;

        tracing::debug!("Authorization completed for subject {}", claims.sub);
        Ok(claims)
    }

    /// Loads and consumes the pending flow state, enforcing the state
    /// binding. The stored state is one-shot: it is deleted as soon as a
    /// matching callback is seen, before the code exchange.
    async fn take_flow_state(&self, params: &CallbackParams) -> AuthResult<ClientFlowState> {
        let serialized = self
            .store
            .get(FLOW_STATE_KEY)
            .await?
            .ok_or(AuthError::NoPendingAuthorization)?;
        let flow_state: ClientFlowState = serde_json::from_str(&serialized)
            .map_err(|e| AuthError::internal(format!("Corrupt flow state: {e}")))?;

        match params.state.as_deref() {
            Some(state) if state == flow_state.state => {}
            _ => return Err(AuthError::StateMismatch),
        }

        self.store.delete(FLOW_STATE_KEY).await?;
        Ok(flow_state)
    }

    /// Clears the local session and, when the provider supports it,
    /// visits the end-session URL through the attached navigator.
    ///
    /// The URL is also returned so hosts without a navigator can perform
    /// the redirect themselves. Without a stored identity token this is a
    /// local no-op.
    pub async fn logout(&self) -> AuthResult<Option<Url>> {
        let Some(identity) = self.ledger.identity_token().await? else {
            tracing::debug!("Logout requested with no active session");
            return Ok(None);
        };

        self.ledger.clear().await?;

        let discovery = self.discovery.document().await?;
        let Some(end_session) = discovery.end_session_endpoint.as_deref() else {
            return Ok(None);
        };

        let mut url = Url::parse(end_session)
            .map_err(|e| AuthError::internal(format!("Invalid end_session_endpoint: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("id_token_hint", &identity.encoded);
            pairs.append_pair("client_id", &self.config.client_id);
            if let Some(post_logout) = &self.config.post_logout_redirect_uri {
                pairs.append_pair("post_logout_redirect_uri", post_logout.as_str());
            }
        }

        if let Some(navigator) = &self.navigator {
            navigator.navigate(&url).await?;
        }

        Ok(Some(url))
    }
}

/// Converts a requested `max_age` into an absolute usage ceiling,
/// saturating instead of overflowing on absurd values.
fn max_age_ceiling(secs: u64) -> OffsetDateTime {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    OffsetDateTime::now_utc()
        .checked_add(time::Duration::seconds(secs))
        .unwrap_or(time::PrimitiveDateTime::MAX.assume_utc())
}

/// Builds the authorization URL from discovery metadata and flow material.
fn build_authorize_url(
    discovery: &DiscoveryDocument,
    config: &ClientConfig,
    material: &FlowMaterial,
    options: &AuthorizeOptions,
    response_mode: Option<&str>,
) -> AuthResult<Url> {
    let mut url = Url::parse(&discovery.authorization_endpoint).map_err(|e| {
        AuthError::internal(format!("Discovery returned invalid authorization endpoint: {e}"))
    })?;

    let scope = compose_scope(&options.scopes, options.offline_access);

    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", &material.state)
            .append_pair("nonce", &material.nonce)
            .append_pair("code_challenge", material.challenge.as_str())
            .append_pair("code_challenge_method", "S256");

        if let Some(audience) = &options.audience {
            pairs.append_pair("audience", audience);
        }
        if let Some(acr_values) = &options.acr_values
            && !acr_values.is_empty()
        {
            pairs.append_pair("acr_values", &acr_values.join(" "));
        }
        if let Some(max_age) = options.max_age {
            pairs.append_pair("max_age", &max_age.to_string());
        }
        if let Some(prompt) = &options.prompt {
            pairs.append_pair("prompt", prompt);
        }
        if let Some(login_hint) = &options.login_hint {
            pairs.append_pair("login_hint", login_hint);
        }
        if let Some(mode) = response_mode {
            pairs.append_pair("response_mode", mode);
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_compose_scope_always_includes_openid() {
        assert_eq!(compose_scope(&[], false), "openid");
        assert_eq!(
            compose_scope(&strings(&["profile", "email"]), false),
            "profile email openid"
        );
        assert_eq!(
            compose_scope(&strings(&["openid", "profile"]), false),
            "openid profile"
        );
    }

    #[test]
    fn test_compose_scope_offline_access() {
        assert_eq!(
            compose_scope(&strings(&["profile"]), true),
            "profile openid offline_access"
        );
        // Already requested explicitly: not duplicated
        assert_eq!(
            compose_scope(&strings(&["offline_access"]), true),
            "offline_access openid"
        );
    }

    #[test]
    fn test_compose_scope_dedups_and_trims() {
        assert_eq!(
            compose_scope(&strings(&["profile", " profile ", "", "email"]), false),
            "profile email openid"
        );
    }

    #[test]
    fn test_callback_params_from_success_url() {
        let url =
            Url::parse("https://app.example.com/callback?code=abc&state=xyz&extra=1").unwrap();
        let params = CallbackParams::from_redirect_url(&url);
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[test]
    fn test_callback_params_from_error_url() {
        let url = Url::parse(
            "https://app.example.com/callback?error=access_denied&error_description=nope&state=xyz",
        )
        .unwrap();
        let params = CallbackParams::from_redirect_url(&url);
        assert!(params.code.is_none());
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("nope"));
    }

    #[test]
    fn test_flow_state_round_trip() {
        let material = FlowMaterial::generate();
        let state = ClientFlowState {
            state: material.state.clone(),
            nonce: material.nonce.clone(),
            verifier: material.verifier.clone(),
            redirect_uri: Url::parse("https://app.example.com/callback").unwrap(),
            scopes: strings(&["openid", "profile"]),
            audience: Some("api".to_string()),
            acr_values: None,
            max_age: Some(300),
            created_at: OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&state).unwrap();
        let restored: ClientFlowState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state, state.state);
        assert_eq!(restored.nonce, state.nonce);
        assert_eq!(restored.verifier.as_str(), state.verifier.as_str());
        assert_eq!(restored.max_age, Some(300));
    }

    #[test]
    fn test_max_age_ceiling_saturates() {
        let now = OffsetDateTime::now_utc();
        let near = max_age_ceiling(300);
        assert!(near > now);
        assert!(near < now + time::Duration::seconds(301));

        // A nonsense max_age must not panic or wrap into the past
        let far = max_age_ceiling(u64::MAX);
        assert!(far >= near);
    }

    #[test]
    fn test_build_authorize_url() {
        let discovery: DiscoveryDocument = serde_json::from_str(
            r#"{
                "issuer": "https://auth.example.com",
                "authorization_endpoint": "https://auth.example.com/authorize",
                "token_endpoint": "https://auth.example.com/token",
                "jwks_uri": "https://auth.example.com/jwks",
                "response_types_supported": ["code"],
                "id_token_signing_alg_values_supported": ["RS256"]
            }"#,
        )
        .unwrap();
        let config = ClientConfig::new(
            Url::parse("https://auth.example.com").unwrap(),
            "client-1",
            Url::parse("https://app.example.com/callback").unwrap(),
        );
        let material = FlowMaterial::generate();
        let options = AuthorizeOptions {
            scopes: strings(&["profile"]),
            audience: Some("api".to_string()),
            acr_values: Some(strings(&["loa2", "loa1"])),
            max_age: Some(600),
            offline_access: true,
            ..Default::default()
        };

        let url = build_authorize_url(&discovery, &config, &material, &options, None).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("code_challenge_method"), Some("S256"));
        assert_eq!(get("code_challenge"), Some(material.challenge.as_str()));
        assert_eq!(get("scope"), Some("profile openid offline_access"));
        assert_eq!(get("acr_values"), Some("loa2 loa1"));
        assert_eq!(get("max_age"), Some("600"));
        assert_eq!(get("audience"), Some("api"));
        // The verifier itself never appears in the URL
        assert!(!url.as_str().contains(material.verifier.as_str()));
    }

    #[test]
    fn test_build_authorize_url_response_mode() {
        let discovery: DiscoveryDocument = serde_json::from_str(
            r#"{
                "issuer": "https://auth.example.com",
                "authorization_endpoint": "https://auth.example.com/authorize",
                "token_endpoint": "https://auth.example.com/token",
                "jwks_uri": "https://auth.example.com/jwks",
                "response_types_supported": ["code"],
                "id_token_signing_alg_values_supported": ["RS256"]
            }"#,
        )
        .unwrap();
        let config = ClientConfig::new(
            Url::parse("https://auth.example.com").unwrap(),
            "client-1",
            Url::parse("https://app.example.com/callback").unwrap(),
        );
        let material = FlowMaterial::generate();
        let url = build_authorize_url(
            &discovery,
            &config,
            &material,
            &AuthorizeOptions::default(),
            Some(WEB_MESSAGE_RESPONSE_MODE),
        )
        .unwrap();
        assert!(url.as_str().contains("response_mode=web_message"));
    }
}
