//! Authenticator method variants.

use serde::{Deserialize, Serialize};

/// The authenticator variants a challenge can resolve to.
///
/// The risk engine may resolve a different method than the hint the caller
/// supplied (unless the strict flag pins it), so the resolved method is
/// always echoed back in the challenge response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    /// Static password verification.
    Password,
    /// One-time passcode delivered by email, SMS, or voice.
    Otp,
    /// Coordinate lookup on a pre-issued grid card.
    Grid,
    /// Knowledge-based answers to enrolled questions.
    Kba,
    /// OATH hardware or software token code.
    Token,
    /// Push confirmation to an enrolled mobile token.
    #[serde(rename = "TOKENPUSH")]
    TokenPush,
    /// Push to a smart-credential-enabled device.
    #[serde(rename = "SMARTCREDENTIALPUSH")]
    SmartCredentialPush,
    /// Administrator-issued temporary access code.
    TempAccessCode,
    /// One-time link delivered out of band and confirmed server-side.
    MagicLink,
    /// FIDO U2F/UAF assertion.
    Fido,
    /// FIDO2/WebAuthn passkey assertion.
    Passkey,
    /// Face biometric verification through the provider SDK.
    Face,
    /// Mutual-TLS user certificate verification.
    UserCertificate,
    /// Delegation to a federated external identity provider.
    ExternalIdp,
}

impl AuthMethod {
    /// Returns the wire name of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "PASSWORD",
            Self::Otp => "OTP",
            Self::Grid => "GRID",
            Self::Kba => "KBA",
            Self::Token => "TOKEN",
            Self::TokenPush => "TOKENPUSH",
            Self::SmartCredentialPush => "SMARTCREDENTIALPUSH",
            Self::TempAccessCode => "TEMP_ACCESS_CODE",
            Self::MagicLink => "MAGIC_LINK",
            Self::Fido => "FIDO",
            Self::Passkey => "PASSKEY",
            Self::Face => "FACE",
            Self::UserCertificate => "USER_CERTIFICATE",
            Self::ExternalIdp => "EXTERNAL_IDP",
        }
    }

    /// Returns `true` for methods that normally complete out of band and
    /// are observed by polling rather than by a submission.
    ///
    /// The challenge response's `poll_for_completion` is still
    /// authoritative; this only reflects the usual cadence.
    #[must_use]
    pub fn usually_polls(&self) -> bool {
        matches!(
            self,
            Self::TokenPush | Self::SmartCredentialPush | Self::Face | Self::MagicLink
        )
    }

    /// Returns `true` for methods whose submission is a WebAuthn assertion.
    #[must_use]
    pub fn uses_webauthn(&self) -> bool {
        matches!(self, Self::Fido | Self::Passkey)
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
