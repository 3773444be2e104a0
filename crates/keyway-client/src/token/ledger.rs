//! Token ledger: selection, refresh, and purge of access-token records.
//!
//! The ledger is the only writer of the persisted record set. Selection is
//! least-privilege: among all records whose audience matches and whose
//! scope set covers the request, the one granting the fewest scopes wins.
//!
//! The read-candidates / refresh / write sequence assumes the engine's
//! single logical thread of control. A host that calls the ledger from
//! genuinely concurrent tasks must wrap it in a critical section, or
//! duplicate refresh grants can race.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::gateway::{IdentityProviderGateway, TokenResponse};
use crate::store::{ACCESS_TOKENS_KEY, CredentialStore, IDENTITY_TOKEN_KEY};
use crate::token::record::{AccessTokenRecord, IdentityTokenRecord};

/// Fallback access-token lifetime when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Owns the persisted access-token records and the session's ID token.
pub struct TokenLedger {
    store: Arc<dyn CredentialStore>,
    gateway: Arc<dyn IdentityProviderGateway>,
    expiry_buffer: Duration,
}

impl TokenLedger {
    /// Creates a ledger over a credential store and gateway.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        gateway: Arc<dyn IdentityProviderGateway>,
        expiry_buffer: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            expiry_buffer,
        }
    }

    /// Selects (and if necessary refreshes) an access token satisfying the
    /// requested scope, audience, and optional ACR constraint.
    ///
    /// 1. Purges records that are stale and hold no refresh token.
    /// 2. Filters by exact audience, scope superset, and ACR membership.
    /// 3. Prefers the candidate granting the fewest scopes.
    /// 4. Returns an un-expired candidate's token unchanged; refreshes a
    ///    stale candidate through the gateway, replacing its record while
    ///    preserving scope, audience, and ACR.
    ///
    /// At most one refresh network call is made per invocation.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoMatchingToken`] when no record satisfies the
    /// request; the caller decides between a fallback re-authorization and
    /// surfacing the failure. A failed refresh deletes the stale record and
    /// propagates the gateway error unchanged.
    pub async fn select_access_token(
        &self,
        scopes: &[&str],
        audience: Option<&str>,
        acr_values: Option<&[&str]>,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.load_records().await?;

        let before = records.len();
        records.retain(|r| !r.is_purgeable(now, self.expiry_buffer));
        if records.len() != before {
            tracing::debug!(
                "Purged {} stale token record(s) without refresh tokens",
                before - records.len()
            );
            self.save_records(&records).await?;
        }

        let mut candidates: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.satisfies(scopes, audience, acr_values))
            .map(|(i, _)| i)
            .collect();
        // Stable sort keeps insertion order among equal cardinalities
        candidates.sort_by_key(|&i| records[i].scope_cardinality());

        let Some(&idx) = candidates.first() else {
            return Err(AuthError::NoMatchingToken);
        };

        if !records[idx].is_stale(now, self.expiry_buffer) {
            return Ok(records[idx].access_token.clone());
        }

        // A stale record without a refresh token cannot survive the purge
        // above, so absence here is an internal consistency violation.
        let refresh_token = records[idx].refresh_token.clone().ok_or_else(|| {
            AuthError::internal("stale token record without refresh token survived purge")
        })?;

        match self.gateway.refresh_token(&refresh_token).await {
            Ok(response) => {
                let token = response.access_token.clone();
                Self::apply_refresh(&mut records[idx], response, refresh_token, now);
                self.save_records(&records).await?;
                tracing::debug!("Refreshed access token for audience {:?}", audience);
                Ok(token)
            }
            Err(err) => {
                // Never leave a half-updated record behind
                records.remove(idx);
                self.save_records(&records).await?;
                tracing::warn!("Refresh grant failed, stale record deleted: {err}");
                Err(err)
            }
        }
    }

    /// Replaces a record's token material in place, preserving its
    /// selection attributes (scope, audience, ACR, max-age ceiling).
    fn apply_refresh(
        record: &mut AccessTokenRecord,
        response: TokenResponse,
        previous_refresh_token: String,
        now: OffsetDateTime,
    ) {
        record.access_token = response.access_token;
        record.refresh_token = response.refresh_token.or(Some(previous_refresh_token));
        record.expires_at = now
            + response
                .expires_in
                .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
    }

    /// Appends a new access-token record built from a token response.
    ///
    /// The granted scope from the response takes precedence over
    /// `requested_scopes` when the provider narrowed or widened the grant.
    pub async fn store_token_response(
        &self,
        response: &TokenResponse,
        requested_scopes: &[String],
        audience: Option<&str>,
        acr: Option<&str>,
        max_age_expiry: Option<OffsetDateTime>,
    ) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();

        let scope: BTreeSet<String> = match &response.scope {
            Some(granted) => granted.split_whitespace().map(String::from).collect(),
            None => requested_scopes.iter().cloned().collect(),
        };

        let record = AccessTokenRecord {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            scope,
            audience: audience.map(String::from),
            acr: acr.map(String::from),
            expires_at: now
                + response
                    .expires_in
                    .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs),
            max_age_expiry,
        };

        let mut records = self.load_records().await?;
        records.push(record);
        self.save_records(&records).await
    }

    /// Overwrites the session's identity token.
    pub async fn store_identity_token(&self, record: &IdentityTokenRecord) -> AuthResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| AuthError::storage(format!("Failed to encode identity token: {e}")))?;
        self.store.save(IDENTITY_TOKEN_KEY, &json).await
    }

    /// Reads the session's identity token, if one is stored.
    pub async fn identity_token(&self) -> AuthResult<Option<IdentityTokenRecord>> {
        match self.store.get(IDENTITY_TOKEN_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| AuthError::storage(format!("Corrupt identity token record: {e}"))),
            None => Ok(None),
        }
    }

    /// Deletes all persisted token state.
    pub async fn clear(&self) -> AuthResult<()> {
        self.store.delete(ACCESS_TOKENS_KEY).await?;
        self.store.delete(IDENTITY_TOKEN_KEY).await
    }

    /// Reads all persisted access-token records.
    pub async fn records(&self) -> AuthResult<Vec<AccessTokenRecord>> {
        self.load_records().await
    }

    async fn load_records(&self) -> AuthResult<Vec<AccessTokenRecord>> {
        match self.store.get(ACCESS_TOKENS_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| AuthError::storage(format!("Corrupt token records: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    async fn save_records(&self, records: &[AccessTokenRecord]) -> AuthResult<()> {
        let json = serde_json::to_string(records)
            .map_err(|e| AuthError::storage(format!("Failed to encode token records: {e}")))?;
        self.store.save(ACCESS_TOKENS_KEY, &json).await
    }
}
