//! OpenID Connect: discovery, key-set handling, ID-token validation, and
//! the authorization code flow with PKCE.

pub mod discovery;
pub mod flow;
pub mod jwks;
pub mod validation;

pub use discovery::{DiscoveryClient, DiscoveryDocument, DiscoveryError};
pub use flow::{
    AuthorizationFlowController, AuthorizeOptions, AuthorizeRequest, CallbackParams,
    ClientFlowState, compose_scope,
};
pub use jwks::{JwksCache, JwksError};
pub use validation::{IdTokenClaims, IdTokenValidator};
