//! Client configuration.
//!
//! [`ClientConfig`] carries everything the session engine needs at
//! construction: issuer, client identity, redirect target, and the
//! operational knobs (expiry buffer, timeouts, clock skew). Validation is
//! fatal at construction; nothing else in the engine re-checks these fields.

use std::time::Duration;

use url::Url;

use crate::error::AuthError;

/// Default buffer subtracted from token expiry when judging staleness.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(15);

/// Configuration for the authentication session engine.
///
/// # Example
///
/// ```ignore
/// use keyway_client::config::ClientConfig;
/// use url::Url;
///
/// let config = ClientConfig::new(
///     Url::parse("https://auth.example.com")?,
///     "my-client",
///     Url::parse("https://app.example.com/callback")?,
/// )
/// .with_expiry_buffer(std::time::Duration::from_secs(30));
/// config.validate()?;
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The provider issuer URL. Discovery is fetched from
    /// `{issuer}/.well-known/openid-configuration`.
    pub issuer: Url,

    /// The OAuth client identifier registered with the provider.
    pub client_id: String,

    /// The redirect URI registered for this client.
    pub redirect_uri: Url,

    /// Buffer subtracted from token expiry when judging staleness
    /// (default: 15 seconds).
    pub expiry_buffer: Duration,

    /// HTTP request timeout for discovery, token, and challenge calls
    /// (default: 30 seconds).
    pub request_timeout: Duration,

    /// Clock skew tolerance for ID token validation (default: 60 seconds).
    pub clock_skew_tolerance: Duration,

    /// Override for the challenge (RBA) endpoint. When absent, the endpoint
    /// is derived from the issuer.
    pub challenge_endpoint: Option<Url>,

    /// Where the provider should send the user after an end-session
    /// redirect, if anywhere.
    pub post_logout_redirect_uri: Option<Url>,

    /// Whether to allow HTTP (non-HTTPS) provider URLs.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl ClientConfig {
    /// Creates a configuration with default operational settings.
    #[must_use]
    pub fn new(issuer: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            issuer,
            client_id: client_id.into(),
            redirect_uri,
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
            request_timeout: Duration::from_secs(30),
            clock_skew_tolerance: Duration::from_secs(60),
            challenge_endpoint: None,
            post_logout_redirect_uri: None,
            allow_http: false,
        }
    }

    /// Sets the token expiry buffer.
    #[must_use]
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the clock skew tolerance for ID token validation.
    #[must_use]
    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    /// Overrides the challenge (RBA) endpoint.
    #[must_use]
    pub fn with_challenge_endpoint(mut self, endpoint: Url) -> Self {
        self.challenge_endpoint = Some(endpoint);
        self
    }

    /// Sets the post-logout redirect URI.
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: Url) -> Self {
        self.post_logout_redirect_uri = Some(uri);
        self
    }

    /// Allows HTTP (non-HTTPS) provider URLs.
    ///
    /// # Warning
    ///
    /// This should only be used for testing. In production, provider
    /// endpoints must always use HTTPS.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if:
    /// - `client_id` is empty
    /// - the issuer is not HTTPS (unless `allow_http` is set)
    /// - the issuer carries a query string or fragment
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::configuration("client_id must not be empty"));
        }

        if self.issuer.scheme() != "https" && !self.allow_http {
            return Err(AuthError::configuration(format!(
                "issuer must use HTTPS, got {}",
                self.issuer.scheme()
            )));
        }

        if self.issuer.query().is_some() || self.issuer.fragment().is_some() {
            return Err(AuthError::configuration(
                "issuer must not contain a query string or fragment",
            ));
        }

        Ok(())
    }

    /// The challenge endpoint, either the configured override or the
    /// default derived from the issuer.
    #[must_use]
    pub fn resolved_challenge_endpoint(&self) -> Url {
        self.challenge_endpoint.clone().unwrap_or_else(|| {
            let mut url = self.issuer.clone();
            {
                let mut segments = url
                    .path_segments_mut()
                    .expect("issuer validated as a base URL");
                segments.pop_if_empty();
                segments.push("v1");
                segments.push("transactions");
            }
            url
        })
    }

    /// The issuer with any trailing slash removed, as used for `iss`
    /// claim comparison.
    #[must_use]
    pub fn issuer_str(&self) -> &str {
        self.issuer.as_str().trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ClientConfig {
        ClientConfig::new(
            Url::parse("https://auth.example.com").unwrap(),
            "client-1",
            Url::parse("https://app.example.com/callback").unwrap(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = base_config();
        assert_eq!(config.expiry_buffer, Duration::from_secs(15));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.allow_http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_client_id_rejected() {
        let mut config = base_config();
        config.client_id = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[test]
    fn test_http_issuer_rejected_by_default() {
        let config = ClientConfig::new(
            Url::parse("http://auth.example.com").unwrap(),
            "client-1",
            Url::parse("https://app.example.com/callback").unwrap(),
        );
        assert!(config.validate().is_err());
        assert!(config.with_allow_http(true).validate().is_ok());
    }

    #[test]
    fn test_issuer_with_query_rejected() {
        let config = ClientConfig::new(
            Url::parse("https://auth.example.com/?tenant=a").unwrap(),
            "client-1",
            Url::parse("https://app.example.com/callback").unwrap(),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_challenge_endpoint_default() {
        let config = base_config();
        assert_eq!(
            config.resolved_challenge_endpoint().as_str(),
            "https://auth.example.com/v1/transactions"
        );
    }

    #[test]
    fn test_resolved_challenge_endpoint_override() {
        let config = base_config().with_challenge_endpoint(
            Url::parse("https://rba.example.com/api/transactions").unwrap(),
        );
        assert_eq!(
            config.resolved_challenge_endpoint().as_str(),
            "https://rba.example.com/api/transactions"
        );
    }

    #[test]
    fn test_issuer_str_trims_trailing_slash() {
        let config = base_config();
        assert_eq!(config.issuer_str(), "https://auth.example.com");
    }
}
