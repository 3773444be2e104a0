//! Host-platform seams.
//!
//! The engine itself never touches a window, an address bar, or an
//! authenticator device. Hosts that have them implement these traits; the
//! flow controller and the RBA transaction call through them.

use async_trait::async_trait;
use url::Url;

use crate::AuthResult;
use crate::oidc::flow::CallbackParams;

/// Opens an authorization URL in a popup and waits for the provider to
/// post the callback parameters back.
///
/// Implementations must return [`crate::error::AuthError::PopupBlocked`]
/// when the host refuses to open the window, so callers can fall back to a
/// full redirect.
#[async_trait]
pub trait PopupDriver: Send + Sync {
    /// Opens `url` and resolves once the provider delivers callback
    /// parameters for `expected_state`, or fails.
    async fn open_and_await_callback(
        &self,
        url: &Url,
        expected_state: &str,
    ) -> AuthResult<CallbackParams>;
}

/// Address-bar control for redirect-based flows.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Replaces the current URL without adding a history entry. Used to
    /// strip callback parameters before the code exchange.
    async fn replace_url(&self, url: &Url) -> AuthResult<()>;

    /// Navigates to `url`, leaving the application.
    async fn navigate(&self, url: &Url) -> AuthResult<()>;
}

/// Access to a platform WebAuthn authenticator.
#[async_trait]
pub trait WebAuthnDriver: Send + Sync {
    /// Whether the platform exposes a WebAuthn authenticator at all.
    fn is_supported(&self) -> bool;

    /// Requests an assertion for the provider's request options and
    /// returns the serialized assertion response.
    async fn get_assertion(&self, options: &serde_json::Value) -> AuthResult<serde_json::Value>;
}
