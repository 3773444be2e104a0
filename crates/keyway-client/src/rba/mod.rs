//! Risk-based authentication (RBA) transactions.
//!
//! One server-tracked transaction resource drives a challenge / submit /
//! poll / cancel cycle across the provider's authenticator variants. The
//! client side is a finite state machine, [`AuthenticationTransaction`],
//! whose cadence differs per method: some methods complete on submission
//! (OTP, grid, KBA), others complete out of band and are observed by
//! polling (push, face, magic link).

pub mod method;
pub mod payload;
pub mod transaction;

pub use method::AuthMethod;
pub use payload::{
    ChallengeParameters, ChallengePayload, ChallengeResponse, ChallengeSubmission,
    FaceChallengeOptions, GridCoordinate, KbaQuestion, OtpDeliveryOptions, PushChallengeOptions,
    SmartCredentialOptions, TransactionDetail,
};
pub use transaction::{AuthenticationTransaction, TransactionOutcome, TransactionState};
