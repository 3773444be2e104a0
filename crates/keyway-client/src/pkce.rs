//! PKCE (Proof Key for Code Exchange) and authorization flow material.
//!
//! Implements the client side of RFC 7636 with S256 only, plus generation of
//! the opaque `state` and `nonce` values every authorization round-trip
//! needs. All values come from a cryptographically secure source and every
//! generation call is independent.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors that can occur when constructing PKCE values from raw strings.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be unreserved ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,
}

/// PKCE code verifier.
///
/// A high-entropy cryptographic random string using the unreserved
/// characters `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`, with a
/// minimum length of 43 characters and a maximum length of 128 characters
/// (RFC 7636 Section 4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Creates a verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is not between 43 and 128 characters
    /// or the string contains characters outside `[A-Za-z0-9-._~]`.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();

        // RFC 7636: verifier must be 43-128 characters
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generates a cryptographically random verifier.
    ///
    /// Generates 32 random bytes and encodes them as base64url
    /// (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        // `gen` is a reserved keyword in Rust 2024, so we use r#gen
        let bytes: [u8; 32] = rng.r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PkceVerifier {
    type Error = PkceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PkceVerifier> for String {
    fn from(verifier: PkceVerifier) -> Self {
        verifier.0
    }
}

/// PKCE code challenge.
///
/// The S256 challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`
/// (RFC 7636 Section 4.2). The "plain" method is never produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Computes the S256 challenge for a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_str().as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    /// Returns the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PkceChallenge {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates an opaque, base64url-encoded value with 32 bytes of entropy
/// from a cryptographically secure source.
///
/// Used for both the `state` and `nonce` parameters.
#[must_use]
pub fn generate_opaque_value() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The full set of per-authorization secrets: state, nonce, verifier, and
/// the derived challenge.
///
/// Every call to [`FlowMaterial::generate`] is independent; nothing is
/// reused between authorization round-trips.
#[derive(Debug, Clone)]
pub struct FlowMaterial {
    /// CSRF-binding state parameter.
    pub state: String,
    /// Replay-binding nonce for the ID token.
    pub nonce: String,
    /// The PKCE code verifier, kept locally until the code exchange.
    pub verifier: PkceVerifier,
    /// The S256 challenge sent in the authorization request.
    pub challenge: PkceChallenge,
}

impl FlowMaterial {
    /// Generates fresh material for one authorization round-trip.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        Self {
            state: generate_opaque_value(),
            nonce: generate_opaque_value(),
            verifier,
            challenge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_generation() {
        let verifier = PkceVerifier::generate();
        let len = verifier.as_str().len();
        assert!(
            (43..=128).contains(&len),
            "Generated verifier length {} should be 43-128",
            len
        );
        assert!(
            verifier
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "Generated verifier should only contain base64url characters"
        );
    }

    #[test]
    fn test_verifier_generation_uniqueness() {
        let v1 = PkceVerifier::generate();
        let v2 = PkceVerifier::generate();
        assert_ne!(v1.as_str(), v2.as_str());
    }

    #[test]
    fn test_verifier_validation_length() {
        assert!(PkceVerifier::new("a".repeat(42)).is_err());
        assert!(PkceVerifier::new("a".repeat(43)).is_ok());
        assert!(PkceVerifier::new("a".repeat(128)).is_ok());
        assert!(matches!(
            PkceVerifier::new("a".repeat(129)).unwrap_err(),
            PkceError::InvalidVerifierLength(129)
        ));
    }

    #[test]
    fn test_verifier_validation_characters() {
        let valid = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._~"
            .chars()
            .cycle()
            .take(64)
            .collect::<String>();
        assert!(PkceVerifier::new(valid).is_ok());

        let invalid = "abcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-____".to_string();
        assert!(matches!(
            PkceVerifier::new(invalid).unwrap_err(),
            PkceError::InvalidVerifierCharacters
        ));
    }

    #[test]
    fn test_challenge_is_sha256_of_verifier() {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);

        let mut hasher = Sha256::new();
        hasher.update(verifier.as_str().as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());

        assert_eq!(challenge.as_str(), expected);
        // SHA-256 produces 32 bytes, base64url encoded = 43 characters
        assert_eq!(challenge.as_str().len(), 43);
    }

    #[test]
    fn test_rfc7636_appendix_b_test_vector() {
        // https://tools.ietf.org/html/rfc7636#appendix-B
        let verifier =
            PkceVerifier::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string()).unwrap();
        let challenge = PkceChallenge::from_verifier(&verifier);
        assert_eq!(
            challenge.as_str(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_opaque_value_entropy() {
        let value = generate_opaque_value();
        // 32 bytes base64url without padding = 43 characters
        assert_eq!(value.len(), 43);
        assert_ne!(value, generate_opaque_value());
    }

    #[test]
    fn test_flow_material_state_differs_from_nonce() {
        let material = FlowMaterial::generate();
        assert_ne!(material.state, material.nonce);
        assert_eq!(
            material.challenge,
            PkceChallenge::from_verifier(&material.verifier)
        );
    }
}
