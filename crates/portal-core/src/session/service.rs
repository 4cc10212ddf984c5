//! Remote profile service trait and its request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::{SessionToken, UserProfile};
use crate::error::BackendError;

/// Result of looking a profile up by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLookup {
    pub profile: UserProfile,
    /// Token issued alongside the profile, if the backend sent one.
    pub token: Option<SessionToken>,
}

/// Status vocabulary of the backend's bank-detail acknowledgement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcknowledgementStatus {
    Approved,
    Rejected,
}

/// Confirmation file attached to an acknowledgement, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePayload {
    pub file_name: String,
    pub content_type: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAcknowledgement {
    pub status: AcknowledgementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidencePayload>,
}

/// Partial profile update sent with `PATCH /profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_acknowledgement: Option<BankAcknowledgement>,
}

impl ProfileUpdate {
    pub fn approve(evidence: EvidencePayload) -> Self {
        Self {
            bank_acknowledgement: Some(BankAcknowledgement {
                status: AcknowledgementStatus::Approved,
                reason: None,
                evidence: Some(evidence),
            }),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            bank_acknowledgement: Some(BankAcknowledgement {
                status: AcknowledgementStatus::Rejected,
                reason: Some(reason.into()),
                evidence: None,
            }),
        }
    }
}

/// Profile endpoints of the backend.
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// `GET /profile-by-identifier/{id}`.
    ///
    /// The token is sent when available (refresh); login has none yet.
    async fn fetch_profile(
        &self,
        identifier: &str,
        token: Option<&SessionToken>,
    ) -> Result<ProfileLookup, BackendError>;

    /// `PATCH /profile`.
    async fn update_profile(
        &self,
        token: &SessionToken,
        update: &ProfileUpdate,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_update_wire_shape() {
        let update = ProfileUpdate::reject("Account number is wrong");
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "bank_acknowledgement": {
                    "status": "REJECTED",
                    "reason": "Account number is wrong"
                }
            })
        );
    }

    #[test]
    fn test_approve_update_wire_shape() {
        let update = ProfileUpdate::approve(EvidencePayload {
            file_name: "letter.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content_base64: "JVBERi0=".to_string(),
        });
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["bank_acknowledgement"]["status"], "APPROVED");
        assert_eq!(json["bank_acknowledgement"]["evidence"]["file_name"], "letter.pdf");
        assert!(json["bank_acknowledgement"].get("reason").is_none());
    }
}
