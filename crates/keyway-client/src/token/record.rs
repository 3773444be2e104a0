//! Token record domain types.
//!
//! Multiple [`AccessTokenRecord`]s may coexist for one session; selection,
//! not key uniqueness, disambiguates them. At most one
//! [`IdentityTokenRecord`] exists per session and it is overwritten on each
//! successful authentication.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A persisted access token and its selection attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRecord {
    /// The bearer access token.
    pub access_token: String,

    /// Refresh token, when the provider granted `offline_access`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes.
    pub scope: BTreeSet<String>,

    /// Audience the token was issued for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Authentication context class reference the token was obtained under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    /// When the access token expires (epoch seconds). Always present.
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,

    /// Hard ceiling from a requested `max_age`, past which the token must
    /// not be used regardless of `expires_at` (epoch seconds).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::timestamp::option"
    )]
    pub max_age_expiry: Option<OffsetDateTime>,
}

impl AccessTokenRecord {
    /// Returns `true` if the token is stale at `now`, judged against the
    /// expiry minus `buffer` or against `max_age_expiry`.
    #[must_use]
    pub fn is_stale(&self, now: OffsetDateTime, buffer: Duration) -> bool {
        let past_expiry = now >= self.expires_at - buffer;
        let past_max_age = self.max_age_expiry.is_some_and(|limit| now >= limit);
        past_expiry || past_max_age
    }

    /// Returns `true` if this record is dead weight: stale with no refresh
    /// token to revive it.
    #[must_use]
    pub fn is_purgeable(&self, now: OffsetDateTime, buffer: Duration) -> bool {
        self.refresh_token.is_none() && self.is_stale(now, buffer)
    }

    /// Returns `true` if this record can satisfy the requested scope,
    /// audience, and (optional) ACR constraint.
    ///
    /// - audience must match exactly (both `None` counts as a match)
    /// - the record's scope set must be a superset of the requested scopes
    /// - if `acr_values` is given, the record's `acr` must be one of them
    #[must_use]
    pub fn satisfies(
        &self,
        scopes: &[&str],
        audience: Option<&str>,
        acr_values: Option<&[&str]>,
    ) -> bool {
        if self.audience.as_deref() != audience {
            return false;
        }

        if !scopes.iter().all(|s| self.scope.contains(*s)) {
            return false;
        }

        if let Some(values) = acr_values {
            return self
                .acr
                .as_deref()
                .is_some_and(|acr| values.contains(&acr));
        }

        true
    }

    /// Number of granted scopes, used for least-privilege ordering.
    #[must_use]
    pub fn scope_cardinality(&self) -> usize {
        self.scope.len()
    }
}

/// The session's ID token: raw compact form plus its decoded claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityTokenRecord {
    /// The encoded JWT as received from the provider.
    pub encoded: String,

    /// The decoded claim set.
    pub claims: serde_json::Value,
}
