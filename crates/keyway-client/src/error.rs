//! Error types for the authentication session engine.
//!
//! The taxonomy distinguishes five classes of failure so callers can branch
//! correctly:
//!
//! 1. **Configuration** - invalid construction input, fatal before any I/O
//! 2. **Protocol** - state/nonce/signature/issuer/audience validation
//!    failures, fatal and never auto-retried
//! 3. **Network** - transport failures surfaced verbatim, retry is caller
//!    policy
//! 4. **Session** - no matching token, no active transaction, expired
//!    transaction; each precisely named so callers can choose between a
//!    fallback re-authorization and an RBA restart
//! 5. **Capability** - blocked popup, unsupported WebAuthn; detected before
//!    the operation is attempted

use std::fmt;

use crate::oidc::discovery::DiscoveryError;
use crate::oidc::jwks::JwksError;

/// Errors that can occur during authentication session operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client configuration is invalid (malformed issuer, missing fields).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The `state` returned in a callback does not match the stored state.
    #[error("State mismatch: callback state does not match stored state")]
    StateMismatch,

    /// The nonce in the ID token does not match the expected nonce.
    #[error("Nonce mismatch: ID token nonce does not match expected nonce")]
    NonceMismatch,

    /// The issuer in the ID token does not match the configured issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The configured issuer.
        expected: String,
        /// The issuer claim from the token.
        actual: String,
    },

    /// The audience in the ID token does not include our client ID.
    #[error("Audience mismatch: ID token audience does not include our client ID")]
    AudienceMismatch,

    /// The ACR in the ID token is not one of the requested ACR values.
    #[error("ACR mismatch: token acr {actual:?} is not among the requested values")]
    AcrMismatch {
        /// The `acr` claim found in the token, if any.
        actual: Option<String>,
    },

    /// The ID token is missing, malformed, or failed signature validation.
    #[error("Invalid ID token: {message}")]
    InvalidIdToken {
        /// Description of the validation failure.
        message: String,
    },

    /// The authorization callback carried neither a code nor an error.
    #[error("Invalid callback: missing both code and error parameters")]
    InvalidCallback,

    /// The identity provider returned an OAuth error response.
    #[error("Provider error: {error} - {description}")]
    Provider {
        /// The OAuth error code.
        error: String,
        /// The provider's error description.
        description: String,
    },

    /// Failed to fetch or validate the discovery document.
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Failed to fetch or use the provider key set.
    #[error("JWKS error: {0}")]
    Jwks(#[from] JwksError),

    /// JWT decoding or validation error.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// A network or transport error occurred.
    #[error("Network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// No persisted token satisfies the requested scope/audience/ACR.
    #[error("No matching token for the requested scope, audience, and ACR")]
    NoMatchingToken,

    /// No authorization flow is awaiting a callback.
    #[error("No pending authorization flow for this callback")]
    NoPendingAuthorization,

    /// No authentication transaction is currently live.
    #[error("No active authentication transaction")]
    NoActiveTransaction,

    /// The server no longer tracks this transaction; restart from
    /// `request_challenge`.
    #[error("Authentication transaction is unknown or expired: {transaction_id}")]
    TransactionExpired {
        /// The transaction id that the server rejected.
        transaction_id: String,
    },

    /// The operation is not valid in the transaction's current state.
    #[error("Invalid transaction state: expected {expected}, was {actual}")]
    InvalidTransactionState {
        /// The state the operation requires.
        expected: &'static str,
        /// The state the transaction was actually in.
        actual: &'static str,
    },

    /// The challenge submission payload is malformed (e.g. KBA answer count
    /// does not match the question count).
    #[error("Invalid submission: {message}")]
    InvalidSubmission {
        /// Description of the payload problem.
        message: String,
    },

    /// The host blocked the authorization popup.
    #[error("Popup blocked by the host environment")]
    PopupBlocked,

    /// The popup response mode is not supported by the provider.
    #[error("Provider does not support the {response_mode} response mode")]
    UnsupportedResponseMode {
        /// The response mode that was required.
        response_mode: String,
    },

    /// WebAuthn is not available in the host environment.
    #[error("WebAuthn is not supported by the host environment")]
    WebAuthnUnsupported,

    /// An error occurred while reading or writing the credential store.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// An internal consistency invariant was violated.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidIdToken` error.
    #[must_use]
    pub fn invalid_id_token(message: impl Into<String>) -> Self {
        Self::InvalidIdToken {
            message: message.into(),
        }
    }

    /// Creates a `Provider` error from an OAuth error response.
    #[must_use]
    pub fn provider(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Provider {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Creates an `IssuerMismatch` error.
    #[must_use]
    pub fn issuer_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IssuerMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a new `TransactionExpired` error.
    #[must_use]
    pub fn transaction_expired(transaction_id: impl Into<String>) -> Self {
        Self::TransactionExpired {
            transaction_id: transaction_id.into(),
        }
    }

    /// Creates a new `InvalidSubmission` error.
    #[must_use]
    pub fn invalid_submission(message: impl Into<String>) -> Self {
        Self::InvalidSubmission {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a protocol validation error.
    ///
    /// Protocol errors are fatal and must never be auto-retried.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch
                | Self::NonceMismatch
                | Self::IssuerMismatch { .. }
                | Self::AudienceMismatch
                | Self::AcrMismatch { .. }
                | Self::InvalidIdToken { .. }
                | Self::InvalidCallback
                | Self::Jwt(_)
        )
    }

    /// Returns `true` if this is a session error that callers can recover
    /// from by re-authorizing or restarting an RBA transaction.
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::NoMatchingToken
                | Self::NoPendingAuthorization
                | Self::NoActiveTransaction
                | Self::TransactionExpired { .. }
                | Self::InvalidTransactionState { .. }
        )
    }

    /// Returns `true` if this is a missing host capability error.
    #[must_use]
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self,
            Self::PopupBlocked | Self::UnsupportedResponseMode { .. } | Self::WebAuthnUnsupported
        )
    }

    /// Returns `true` if this is a network or external service error.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Discovery(_) | Self::Jwks(_) | Self::Provider { .. }
        )
    }

    /// Returns the error category for logging and caller branching.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::StateMismatch
            | Self::NonceMismatch
            | Self::IssuerMismatch { .. }
            | Self::AudienceMismatch
            | Self::AcrMismatch { .. }
            | Self::InvalidIdToken { .. }
            | Self::InvalidCallback
            | Self::Jwt(_) => ErrorCategory::Protocol,
            Self::Provider { .. } | Self::Discovery(_) | Self::Jwks(_) | Self::Network { .. } => {
                ErrorCategory::Network
            }
            Self::NoMatchingToken
            | Self::NoPendingAuthorization
            | Self::NoActiveTransaction
            | Self::TransactionExpired { .. }
            | Self::InvalidTransactionState { .. }
            | Self::InvalidSubmission { .. } => ErrorCategory::Session,
            Self::PopupBlocked
            | Self::UnsupportedResponseMode { .. }
            | Self::WebAuthnUnsupported => ErrorCategory::Capability,
            Self::Storage { .. } => ErrorCategory::Storage,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Categories of session-engine errors for logging and caller branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid construction input.
    Configuration,
    /// Protocol validation failures (state, nonce, signature, claims).
    Protocol,
    /// Transport and provider errors.
    Network,
    /// Recoverable session-state errors.
    Session,
    /// Missing host capabilities.
    Capability,
    /// Credential store failures.
    Storage,
    /// Internal consistency violations.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Protocol => write!(f, "protocol"),
            Self::Network => write!(f, "network"),
            Self::Session => write!(f, "session"),
            Self::Capability => write!(f, "capability"),
            Self::Storage => write!(f, "storage"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::configuration("issuer must be an absolute URL");
        assert_eq!(
            err.to_string(),
            "Configuration error: issuer must be an absolute URL"
        );

        let err = AuthError::issuer_mismatch("https://a.example", "https://b.example");
        assert!(err.to_string().contains("https://a.example"));
        assert!(err.to_string().contains("https://b.example"));

        let err = AuthError::provider("access_denied", "user declined");
        assert_eq!(err.to_string(), "Provider error: access_denied - user declined");

        let err = AuthError::transaction_expired("txn-42");
        assert!(err.to_string().contains("txn-42"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthError::StateMismatch.is_protocol_error());
        assert!(AuthError::NonceMismatch.is_protocol_error());
        assert!(!AuthError::StateMismatch.is_session_error());

        assert!(AuthError::NoMatchingToken.is_session_error());
        assert!(AuthError::NoActiveTransaction.is_session_error());
        assert!(AuthError::transaction_expired("t").is_session_error());

        assert!(AuthError::PopupBlocked.is_capability_error());
        assert!(AuthError::WebAuthnUnsupported.is_capability_error());

        assert!(AuthError::network("connection reset").is_network_error());
        assert!(AuthError::provider("server_error", "oops").is_network_error());
        assert!(!AuthError::NoMatchingToken.is_network_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::configuration("x").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(AuthError::StateMismatch.category(), ErrorCategory::Protocol);
        assert_eq!(
            AuthError::network("x").category(),
            ErrorCategory::Network
        );
        assert_eq!(
            AuthError::NoMatchingToken.category(),
            ErrorCategory::Session
        );
        assert_eq!(AuthError::PopupBlocked.category(), ErrorCategory::Capability);
        assert_eq!(AuthError::storage("x").category(), ErrorCategory::Storage);
        assert_eq!(AuthError::internal("x").category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Protocol.to_string(), "protocol");
        assert_eq!(ErrorCategory::Session.to_string(), "session");
        assert_eq!(ErrorCategory::Capability.to_string(), "capability");
    }
}
