//! Challenge request parameters, response payloads, and submissions.
//!
//! The submission side is a tagged union: exactly one variant per call,
//! discriminated by the enum itself rather than by which optional field a
//! caller happened to populate.

use serde::{Deserialize, Serialize};

use super::method::AuthMethod;

/// Parameters for requesting a new authentication challenge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeParameters {
    /// Method hint. When absent, the provider's risk policy chooses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<AuthMethod>,

    /// When set, the provider must use the hinted method rather than
    /// treating it as a preference.
    #[serde(default)]
    pub strict: bool,

    /// Password for combined password-plus-second-factor flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// OTP delivery options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<OtpDeliveryOptions>,

    /// Push (mobile token / smart credential push) options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushChallengeOptions>,

    /// Face biometric options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceChallengeOptions>,

    /// Smart-credential display options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_credential: Option<SmartCredentialOptions>,

    /// Transaction details shown to the user for risk confirmation flows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transaction_details: Vec<TransactionDetail>,
}

/// Where and how an OTP should be delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpDeliveryOptions {
    /// Delivery channel: "EMAIL", "SMS", or "VOICE".
    pub delivery_channel: String,

    /// The enrolled contact attribute to deliver to (e.g. a specific
    /// masked email), when the user has more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_attribute: Option<String>,
}

/// Options for push-style challenges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChallengeOptions {
    /// Require the user to pick the matching value on the device
    /// (number-matching mutual challenge).
    #[serde(default)]
    pub mutual_challenge_enabled: bool,
}

/// Options for face biometric challenges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceChallengeOptions {
    /// Require a mutual challenge alongside the biometric.
    #[serde(default)]
    pub mutual_challenge_enabled: bool,
}

/// Options for smart-credential challenges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartCredentialOptions {
    /// Text displayed on the device during confirmation.
    pub text: String,
}

/// A name/value pair shown to the user when confirming a risky transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    /// Display name of the detail (e.g. "Amount").
    pub name: String,
    /// Display value of the detail (e.g. "$1,500.00").
    pub value: String,
}

/// A coordinate on a pre-issued grid card the user must look up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCoordinate {
    /// Row label.
    pub row: String,
    /// Column label.
    pub column: String,
}

/// An enrolled knowledge-based question.
///
/// Answers must be submitted in exactly this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KbaQuestion {
    /// Stable identifier of the enrolled question.
    pub id: String,
    /// The question text.
    pub question: String,
}

/// Method-specific data the caller needs to complete a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChallengePayload {
    /// The method needs no data beyond a user response (OTP, password,
    /// token code, temp access code) or completes out of band (push,
    /// magic link).
    None,

    /// Grid coordinates the user must look up, in order.
    Grid {
        /// The coordinates to look up.
        coordinates: Vec<GridCoordinate>,
    },

    /// Ordered KBA questions. Answers align 1:1 with this order.
    Kba {
        /// The questions to answer, in submission order.
        questions: Vec<KbaQuestion>,
    },

    /// WebAuthn assertion request options to pass to the authenticator.
    WebAuthn {
        /// `PublicKeyCredentialRequestOptions` as provider JSON.
        assertion_options: serde_json::Value,
    },

    /// Token for initializing the face-capture SDK.
    Face {
        /// Opaque SDK token.
        sdk_token: String,
    },

    /// Metadata about an issued temporary access code.
    TempAccessCode {
        /// Number of characters in the issued code.
        code_length: u32,
    },
}

/// A challenge as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    /// The server-tracked transaction id.
    pub transaction_id: String,

    /// The method the risk policy resolved to.
    pub method: AuthMethod,

    /// Whether completion is observed by polling (`true`) or by a
    /// submission (`false`).
    pub poll_for_completion: bool,

    /// Method-specific payload.
    pub payload: ChallengePayload,
}

/// One challenge submission. Exactly one variant per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChallengeSubmission {
    /// Free-form response string: OTP code, grid values, token code,
    /// password, temp access code, or magic-link confirmation value.
    Response {
        /// The user's response.
        response: String,
    },

    /// Ordered KBA answers, aligned 1:1 with the question order from the
    /// challenge payload.
    KbaAnswers {
        /// The answers, in question order.
        answers: Vec<String>,
    },

    /// A signed WebAuthn assertion from the authenticator.
    WebAuthn {
        /// The assertion response as provider JSON.
        assertion: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_parameters_serialization_skips_absent_fields() {
        let params = ChallengeParameters {
            method: Some(AuthMethod::Otp),
            otp: Some(OtpDeliveryOptions {
                delivery_channel: "EMAIL".to_string(),
                delivery_attribute: None,
            }),
            ..ChallengeParameters::default()
        };

        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"method\":\"OTP\""));
        assert!(json.contains("deliveryChannel"));
        assert!(!json.contains("password"));
        assert!(!json.contains("transactionDetails"));
    }

    #[test]
    fn test_challenge_response_round_trip() {
        let json = r#"{
            "transactionId": "txn-1",
            "method": "KBA",
            "pollForCompletion": false,
            "payload": {
                "kind": "kba",
                "questions": [
                    {"id": "q1", "question": "First pet?"},
                    {"id": "q2", "question": "First street?"}
                ]
            }
        }"#;

        let response: ChallengeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.transaction_id, "txn-1");
        assert_eq!(response.method, AuthMethod::Kba);
        assert!(!response.poll_for_completion);
        match &response.payload {
            ChallengePayload::Kba { questions } => {
                assert_eq!(questions.len(), 2);
                assert_eq!(questions[0].id, "q1");
            }
            other => panic!("Expected KBA payload, got {other:?}"),
        }
    }

    #[test]
    fn test_submission_is_tagged() {
        let submission = ChallengeSubmission::Response {
            response: "123456".to_string(),
        };
        let json = serde_json::to_string(&submission).unwrap();
        assert!(json.contains("\"kind\":\"response\""));

        let submission = ChallengeSubmission::KbaAnswers {
            answers: vec!["rex".to_string(), "main".to_string()],
        };
        let json = serde_json::to_string(&submission).unwrap();
        assert!(json.contains("\"kind\":\"kbaAnswers\""));
    }
}
