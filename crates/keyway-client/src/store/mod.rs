//! Credential persistence.
//!
//! All persisted session state goes through one key-value interface,
//! [`CredentialStore`], so backends are interchangeable: the in-process
//! [`MemoryCredentialStore`] for tests and short-lived hosts, and durable
//! backends in separate crates (e.g. `keyway-store-file`).

pub mod memory;

pub use memory::MemoryCredentialStore;

use async_trait::async_trait;

use crate::AuthResult;

/// Store key for the persisted access-token records (a JSON array).
pub const ACCESS_TOKENS_KEY: &str = "keyway.access_tokens";

/// Store key for the single persisted identity-token record.
pub const IDENTITY_TOKEN_KEY: &str = "keyway.identity_token";

/// Store key for the in-flight authorization flow state.
pub const FLOW_STATE_KEY: &str = "keyway.flow_state";

/// Key-value persistence contract for session credentials.
///
/// The session engine is the exclusive owner of the keys it writes; hosts
/// must not share the backing namespace with other writers. Implementations
/// rely on the engine's single logical thread of control rather than
/// locking; hosts that call the engine from genuinely concurrent tasks must
/// serialize access externally.
///
/// # Example Implementation
///
/// ```ignore
/// use keyway_client::store::CredentialStore;
/// use keyway_client::AuthResult;
///
/// struct EnvStore;
///
/// #[async_trait::async_trait]
/// impl CredentialStore for EnvStore {
///     async fn get(&self, key: &str) -> AuthResult<Option<String>> { /* ... */ }
///     async fn save(&self, key: &str, value: &str) -> AuthResult<()> { /* ... */ }
///     async fn delete(&self, key: &str) -> AuthResult<()> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Returns
    ///
    /// Returns `Some(value)` if present, `None` if the key has never been
    /// written or has been deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    async fn get(&self, key: &str) -> AuthResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    async fn save(&self, key: &str, value: &str) -> AuthResult<()>;

    /// Deletes the value stored under `key`.
    ///
    /// Deleting a key that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    async fn delete(&self, key: &str) -> AuthResult<()>;
}
