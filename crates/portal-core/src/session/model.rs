//! Session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque bearer token issued by the backend.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub account_number: Option<String>,
    pub ifsc_code: Option<String>,
    pub micr_code: Option<String>,
    pub branch_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingLine {
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Snapshot of the employee profile as last returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Login identifier (the employee's email).
    pub email: String,
    pub name: String,
    pub role: String,
    /// Avatar URL.
    pub avatar: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub consultant_id: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub contract_start: Option<String>,
    #[serde(default)]
    pub contract_end: Option<String>,
    #[serde(default)]
    pub consultant_fee: Option<String>,
    #[serde(default)]
    pub reporting_to: ReportingLine,
    #[serde(default)]
    pub bank_details: BankDetails,
}

impl UserProfile {
    /// First word of the display name, used for greetings.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("User")
    }
}

/// The authenticated identity held by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier used to (re-)fetch the profile.
    pub identifier: String,
    pub token: SessionToken,
    pub user: UserProfile,
    /// When `user` was last confirmed by the backend.
    pub fetched_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identifier: impl Into<String>, token: SessionToken, user: UserProfile) -> Self {
        Self {
            identifier: identifier.into(),
            token,
            user,
            fetched_at: Utc::now(),
        }
    }

    /// Overwrites the profile snapshot with a fresh one from the backend.
    ///
    /// The token is only replaced when the backend issued a new one.
    pub fn apply_refresh(&mut self, user: UserProfile, token: Option<SessionToken>) {
        self.user = user;
        if let Some(token) = token {
            self.token = token;
        }
        self.fetched_at = Utc::now();
    }
}

#[cfg(test)]
fn sample_profile(email: &str) -> UserProfile {
    UserProfile {
        email: email.to_string(),
        name: "Paul Barber".to_string(),
        role: "Consultant".to_string(),
        avatar: "https://example.com/avatar.png".to_string(),
        phone: None,
        consultant_id: Some("C-001".to_string()),
        gender: None,
        dob: None,
        contract_start: None,
        contract_end: None,
        consultant_fee: None,
        reporting_to: ReportingLine::default(),
        bank_details: BankDetails::default(),
    }
}
