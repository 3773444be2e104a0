//! Client-side transaction state machine.
//!
//! One [`AuthenticationTransaction`] tracks one server-side challenge
//! transaction from request to a terminal state. Submission-completed
//! methods move through `AwaitingSubmission`; out-of-band methods move
//! through `AwaitingPoll`, where the caller drives single-shot polls at
//! its own cadence. Completion stores the issued tokens exactly once.

use std::sync::Arc;

use crate::AuthResult;
use crate::error::AuthError;
use crate::gateway::{IdentityProviderGateway, TokenResponse};
use crate::oidc::validation::decode_claims_unverified;
use crate::rba::method::AuthMethod;
use crate::rba::payload::{
    ChallengeParameters, ChallengePayload, ChallengeResponse, ChallengeSubmission,
};
use crate::token::ledger::TokenLedger;
use crate::token::record::IdentityTokenRecord;

/// Lifecycle states of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No challenge has been requested yet.
    Uninitialized,
    /// A challenge request is in flight.
    ChallengeRequested,
    /// The provider expects a submission to complete.
    AwaitingSubmission,
    /// The provider completes out of band; the caller polls.
    AwaitingPoll,
    /// Authentication succeeded and tokens were stored.
    Completed,
    /// The caller cancelled the transaction.
    Cancelled,
    /// The transaction failed or expired server-side.
    Failed,
}

impl TransactionState {
    /// Short name used in error reporting.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::ChallengeRequested => "challengeRequested",
            Self::AwaitingSubmission => "awaitingSubmission",
            Self::AwaitingPoll => "awaitingPoll",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether this is a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a submission or poll.
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    /// The transaction is still pending (out-of-band step not done, or a
    /// submission triggered a poll phase).
    Pending,
    /// Authentication completed; tokens were stored in the ledger.
    Completed {
        /// Claims of the issued ID token, when one was returned.
        claims: Option<serde_json::Value>,
    },
}

impl TransactionOutcome {
    /// Whether the transaction reached completion.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A single risk-based authentication transaction.
pub struct AuthenticationTransaction {
    gateway: Arc<dyn IdentityProviderGateway>,
    ledger: Arc<TokenLedger>,
    state: TransactionState,
    transaction_id: Option<String>,
    method: Option<AuthMethod>,
    payload: Option<ChallengePayload>,
}

impl AuthenticationTransaction {
    /// Creates a fresh, unstarted transaction.
    #[must_use]
    pub fn new(gateway: Arc<dyn IdentityProviderGateway>, ledger: Arc<TokenLedger>) -> Self {
        Self {
            gateway,
            ledger,
            state: TransactionState::Uninitialized,
            transaction_id: None,
            method: None,
            payload: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Server-side transaction id, once one exists.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// The method the risk policy resolved to, once known.
    #[must_use]
    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }

    /// The pending challenge payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&ChallengePayload> {
        self.payload.as_ref()
    }

    /// Requests a challenge from the provider.
    ///
    /// On success the transaction is in `AwaitingSubmission` or
    /// `AwaitingPoll`, depending on how the resolved method completes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTransactionState`] if a challenge has
    /// already been requested on this transaction.
    pub async fn request_challenge(
        &mut self,
        parameters: &ChallengeParameters,
    ) -> AuthResult<ChallengeResponse> {
        if self.state != TransactionState::Uninitialized {
            return Err(AuthError::InvalidTransactionState {
                expected: TransactionState::Uninitialized.as_str(),
                actual: self.state.as_str(),
            });
        }

        self.state = TransactionState::ChallengeRequested;
        let response = match self.gateway.request_challenge(parameters).await {
            Ok(response) => response,
            Err(err) => {
                self.state = TransactionState::Failed;
                return Err(err);
            }
        };

        tracing::debug!(
            "Challenge {} issued via {} (poll: {})",
            response.transaction_id,
            response.method,
            response.poll_for_completion
        );

        self.transaction_id = Some(response.transaction_id.clone());
        self.method = Some(response.method);
        self.payload = Some(response.payload.clone());
        self.state = if response.poll_for_completion {
            TransactionState::AwaitingPoll
        } else {
            TransactionState::AwaitingSubmission
        };

        Ok(response)
    }

    /// Submits a challenge response.
    ///
    /// Submissions are validated against the pending payload before any
    /// network call: KBA answers must align one-to-one with the question
    /// order, and WebAuthn challenges take only assertions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTransactionState`] unless the
    /// transaction is awaiting a submission, and
    /// [`AuthError::InvalidSubmission`] when the submission does not fit
    /// the pending payload.
    pub async fn submit_challenge(
        &mut self,
        submission: &ChallengeSubmission,
    ) -> AuthResult<TransactionOutcome> {
        if self.state != TransactionState::AwaitingSubmission {
            return Err(AuthError::InvalidTransactionState {
                expected: TransactionState::AwaitingSubmission.as_str(),
                actual: self.state.as_str(),
            });
        }

        self.validate_submission(submission)?;

        let transaction_id = self
            .transaction_id
            .clone()
            .ok_or(AuthError::NoActiveTransaction)?;

        let outcome = match self.gateway.submit_challenge(&transaction_id, submission).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail_on_fatal(&err);
                return Err(err);
            }
        };

        if outcome.completed {
            return self.finalize(outcome.tokens).await;
        }

        if outcome.poll_for_completion {
            // e.g. a password submission that triggered a second-factor push
            self.state = TransactionState::AwaitingPoll;
        }
        Ok(TransactionOutcome::Pending)
    }

    /// Polls the transaction once.
    ///
    /// Polling is single-shot: one call, one provider round-trip. Cadence
    /// and backoff are the caller's concern. A transport failure leaves
    /// the transaction pollable.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTransactionState`] unless the
    /// transaction is in the poll phase.
    pub async fn poll_for_completion(&mut self) -> AuthResult<TransactionOutcome> {
        if self.state != TransactionState::AwaitingPoll {
            return Err(AuthError::InvalidTransactionState {
                expected: TransactionState::AwaitingPoll.as_str(),
                actual: self.state.as_str(),
            });
        }

        let transaction_id = self
            .transaction_id
            .clone()
            .ok_or(AuthError::NoActiveTransaction)?;

        let outcome = match self.gateway.poll_transaction(&transaction_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail_on_fatal(&err);
                return Err(err);
            }
        };

        if outcome.completed {
            return self.finalize(outcome.tokens).await;
        }
        Ok(TransactionOutcome::Pending)
    }

    /// Cancels the transaction.
    ///
    /// The server-side cancel is best effort: a transaction the server
    /// already dropped still cancels locally.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTransactionState`] when the transaction
    /// is already terminal or was never started.
    pub async fn cancel(&mut self) -> AuthResult<()> {
        if self.state.is_terminal() || self.state == TransactionState::Uninitialized {
            return Err(AuthError::InvalidTransactionState {
                expected: TransactionState::AwaitingSubmission.as_str(),
                actual: self.state.as_str(),
            });
        }

        if let Some(transaction_id) = self.transaction_id.clone() {
            match self.gateway.cancel_transaction(&transaction_id).await {
                Ok(()) | Err(AuthError::TransactionExpired { .. }) => {}
                Err(err) => {
                    tracing::warn!("Server-side cancel of {} failed: {}", transaction_id, err);
                }
            }
        }

        self.state = TransactionState::Cancelled;
        self.payload = None;
        Ok(())
    }

    /// Checks a submission against the pending challenge payload.
    fn validate_submission(&self, submission: &ChallengeSubmission) -> AuthResult<()> {
        match (self.payload.as_ref(), submission) {
            (Some(ChallengePayload::Kba { questions }), ChallengeSubmission::KbaAnswers { answers }) => {
                if answers.len() != questions.len() {
                    return Err(AuthError::invalid_submission(format!(
                        "expected {} KBA answers, got {}",
                        questions.len(),
                        answers.len()
                    )));
                }
                Ok(())
            }
            (Some(ChallengePayload::Kba { .. }), _) => Err(AuthError::invalid_submission(
                "KBA challenges take ordered answers",
            )),
            (Some(ChallengePayload::WebAuthn { .. }), ChallengeSubmission::WebAuthn { .. }) => {
                Ok(())
            }
            (Some(ChallengePayload::WebAuthn { .. }), _) => Err(AuthError::invalid_submission(
                "WebAuthn challenges take an assertion",
            )),
            (_, ChallengeSubmission::Response { .. }) => Ok(()),
            (_, _) => Err(AuthError::invalid_submission(
                "submission does not match the pending challenge",
            )),
        }
    }

    /// Stores the issued tokens and moves to `Completed`.
    async fn finalize(&mut self, tokens: Option<TokenResponse>) -> AuthResult<TransactionOutcome> {
        let tokens = tokens.ok_or_else(|| {
            self.state = TransactionState::Failed;
            AuthError::internal("provider reported completion without tokens")
        })?;

        // The ID token arrived over the direct TLS channel, so its claims
        // are read without signature validation
        let claims = match tokens.id_token.as_deref() {
            Some(id_token) => {
                let claims = decode_claims_unverified(id_token)?;
                self.ledger
                    .store_identity_token(&IdentityTokenRecord {
                        encoded: id_token.to_string(),
                        claims: claims.clone(),
                    })
                    .await?;
                Some(claims)
            }
            None => None,
        };

        let acr = claims
            .as_ref()
            .and_then(|c| c.get("acr"))
            .and_then(|v| v.as_str())
            .map(String::from);

        // A challenge completion is an OIDC authentication, so when the
        // provider omits the granted scope the record still carries openid
        // and stays selectable
        let fallback_scope = ["openid".to_string()];
        self.ledger
            .store_token_response(&tokens, &fallback_scope, None, acr.as_deref(), None)
            .await?;

        self.state = TransactionState::Completed;
        self.payload = None;

        tracing::debug!(
            "Transaction {} completed",
            self.transaction_id.as_deref().unwrap_or("<unknown>")
        );

        Ok(TransactionOutcome::Completed { claims })
    }

    /// Only a transaction the server no longer tracks is dead. Provider
    /// rejections (e.g. a wrong OTP) leave the transaction resubmittable,
    /// and transport failures leave it pollable.
    fn fail_on_fatal(&mut self, err: &AuthError) {
        if matches!(err, AuthError::TransactionExpired { .. }) {
            self.state = TransactionState::Failed;
            self.payload = None;
        }
    }
}
