//! Access-token records and the token ledger.
//!
//! The ledger owns the persisted [`AccessTokenRecord`] set and implements
//! least-privilege selection, refresh-on-expiry, and stale-record purge.

pub mod ledger;
pub mod record;

pub use ledger::TokenLedger;
pub use record::{AccessTokenRecord, IdentityTokenRecord};
