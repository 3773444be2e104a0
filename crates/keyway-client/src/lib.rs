//! # keyway-client
//!
//! Client-side authentication session engine.
//!
//! This crate provides:
//! - OAuth 2.0 authorization code flow with PKCE (S256 only)
//! - OpenID Connect discovery and ID-token validation
//! - Token lifecycle management with least-privilege selection
//! - Risk-based authentication (RBA) challenge transactions
//! - Pluggable credential persistence
//!
//! ## Overview
//!
//! The engine is organized around [`AuthSession`]: one session per
//! provider/client pair, wiring the authorization flow, the token ledger,
//! and at most one live RBA transaction over a shared credential store and
//! provider gateway. Hosts supply the platform seams (popups, navigation,
//! WebAuthn) through the traits in [`platform`].
//!
//! ## Modules
//!
//! - [`config`] - Client configuration
//! - [`error`] - Error types and categories
//! - [`gateway`] - Provider network contract and HTTP implementation
//! - [`oidc`] - Discovery, key sets, ID-token validation, code flow
//! - [`pkce`] - PKCE and authorization flow material
//! - [`platform`] - Host-platform seams (popup, navigator, WebAuthn)
//! - [`rba`] - Risk-based authentication transactions
//! - [`session`] - The session facade
//! - [`store`] - Credential persistence
//! - [`token`] - Token records and the token ledger

pub mod config;
pub mod error;
pub mod gateway;
pub mod oidc;
pub mod pkce;
pub mod platform;
pub mod rba;
pub mod session;
pub mod store;
pub mod token;

pub use config::{ClientConfig, DEFAULT_EXPIRY_BUFFER};
pub use error::{AuthError, ErrorCategory};
pub use gateway::{
    CodeExchangeRequest, HttpGateway, IdentityProviderGateway, PollOutcome, SubmissionOutcome,
    TokenResponse, UserInfoPayload,
};
pub use oidc::{
    AuthorizationFlowController, AuthorizeOptions, AuthorizeRequest, CallbackParams,
    ClientFlowState, DiscoveryClient, DiscoveryDocument, DiscoveryError, IdTokenClaims,
    IdTokenValidator, JwksCache, JwksError, compose_scope,
};
pub use pkce::{FlowMaterial, PkceChallenge, PkceError, PkceVerifier, generate_opaque_value};
pub use platform::{Navigator, PopupDriver, WebAuthnDriver};
pub use rba::{
    AuthMethod, AuthenticationTransaction, ChallengeParameters, ChallengePayload,
    ChallengeResponse, ChallengeSubmission, TransactionOutcome, TransactionState,
};
pub use session::AuthSession;
pub use store::{
    ACCESS_TOKENS_KEY, CredentialStore, FLOW_STATE_KEY, IDENTITY_TOKEN_KEY, MemoryCredentialStore,
};
pub use token::{AccessTokenRecord, IdentityTokenRecord, TokenLedger};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ClientConfig;
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::gateway::IdentityProviderGateway;
    pub use crate::oidc::AuthorizeOptions;
    pub use crate::rba::{AuthMethod, ChallengeParameters, ChallengeSubmission};
    pub use crate::session::AuthSession;
    pub use crate::store::CredentialStore;
    pub use crate::{AuthResult, TokenLedger};
}
