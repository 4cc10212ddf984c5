//! Wire shapes of the portal backend and their mapping into domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portal_core::notification::{Notification, NotificationId, NotificationKind};
use portal_core::session::{BankDetails, ProfileLookup, ReportingLine, SessionToken, UserProfile};

const DEFAULT_ROLE: &str = "Consultant";
const AVATAR_SERVICE_URL: &str = "https://ui-avatars.com/api/";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountDto {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Body of `GET /profile-by-identifier/{id}/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub user: AccountDto,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
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
    /// Decimal fields arrive as strings or numbers depending on the serializer.
    #[serde(default)]
    pub consultant_fee: Option<serde_json::Value>,
    #[serde(default)]
    pub reporting_to_name: Option<String>,
    #[serde(default)]
    pub reporting_to_role: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub ifsc_code: Option<String>,
    #[serde(default)]
    pub micr_code: Option<String>,
    #[serde(default)]
    pub branch_address: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl ProfileResponse {
    /// Maps the payload into a profile, using `identifier` when the
    /// backend omits the email.
    pub fn into_lookup(self, identifier: &str) -> ProfileLookup {
        let first = non_blank(self.user.first_name.as_deref()).unwrap_or_default();
        let last = non_blank(self.user.last_name.as_deref()).unwrap_or_default();
        let full_name = format!("{} {}", first, last).trim().to_string();

        let name = if full_name.is_empty() {
            non_blank(self.user.username.as_deref())
                .or_else(|| non_blank(Some(identifier)))
                .unwrap_or_default()
        } else {
            full_name.clone()
        };

        let avatar = non_blank(self.profile_picture.as_deref())
            .unwrap_or_else(|| initials_avatar_url(if full_name.is_empty() { &name } else { &full_name }));

        let profile = UserProfile {
            email: non_blank(self.user.email.as_deref()).unwrap_or_else(|| identifier.to_string()),
            name,
            role: non_blank(self.designation.as_deref()).unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            avatar,
            phone: self.phone,
            consultant_id: self.consultant_id,
            gender: self.gender,
            dob: self.dob,
            contract_start: self.contract_start,
            contract_end: self.contract_end,
            consultant_fee: self.consultant_fee.and_then(json_scalar_to_string),
            reporting_to: ReportingLine {
                name: self.reporting_to_name,
                role: self.reporting_to_role,
            },
            bank_details: BankDetails {
                account_number: self.account_number,
                ifsc_code: self.ifsc_code,
                micr_code: self.micr_code,
                branch_address: self.branch_address,
            },
        };

        ProfileLookup {
            profile,
            token: non_blank(self.token.as_deref()).map(SessionToken::new),
        }
    }
}

/// One element of `GET /notifications/`.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationDto {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl From<NotificationDto> for Notification {
    fn from(dto: NotificationDto) -> Self {
        let kind = match dto.notification_type.as_str() {
            "ACTION_REQUIRED" => NotificationKind::ActionRequired,
            _ => NotificationKind::Info,
        };
        let created_at = dto
            .created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Notification {
            id: NotificationId(dto.id),
            kind,
            title: dto.title,
            message: dto.message,
            is_read: dto.is_read,
            created_at,
        }
    }
}

/// Body of `PATCH /notifications/{id}/`.
#[derive(Debug, Serialize)]
pub struct MarkReadRequest {
    pub read: bool,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn json_scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn initials_avatar_url(name: &str) -> String {
    let query_name = name.split_whitespace().collect::<Vec<_>>().join("+");
    format!(
        "{}?name={}&background=0D8ABC&color=fff",
        AVATAR_SERVICE_URL, query_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ProfileResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_full_profile_mapping() {
        let lookup = parse(
            r#"{
                "user": {"email": "asha@corp.com", "first_name": "Asha", "last_name": "Rao", "username": "asha"},
                "designation": "Senior Consultant",
                "profile_picture": "https://cdn.example.com/asha.png",
                "consultant_id": "C-42",
                "consultant_fee": "1500.00",
                "reporting_to_name": "Meera",
                "reporting_to_role": "Manager",
                "account_number": "000123",
                "ifsc_code": "HDFC0001",
                "token": "tok-abc"
            }"#,
        )
        .into_lookup("asha@corp.com");

        let profile = lookup.profile;
        assert_eq!(profile.name, "Asha Rao");
        assert_eq!(profile.role, "Senior Consultant");
        assert_eq!(profile.avatar, "https://cdn.example.com/asha.png");
        assert_eq!(profile.consultant_fee.as_deref(), Some("1500.00"));
        assert_eq!(profile.reporting_to.name.as_deref(), Some("Meera"));
        assert_eq!(profile.bank_details.ifsc_code.as_deref(), Some("HDFC0001"));
        assert_eq!(lookup.token, Some(SessionToken::new("tok-abc")));
    }

    #[test]
    fn test_profile_fallbacks() {
        let lookup = parse(
            r#"{
                "user": {"email": "", "first_name": "", "last_name": " ", "username": "pbarber"},
                "designation": null,
                "consultant_fee": 1200.5
            }"#,
        )
        .into_lookup("paul@corp.com");

        let profile = lookup.profile;
        assert_eq!(profile.email, "paul@corp.com");
        assert_eq!(profile.name, "pbarber");
        assert_eq!(profile.role, "Consultant");
        assert_eq!(
            profile.avatar,
            "https://ui-avatars.com/api/?name=pbarber&background=0D8ABC&color=fff"
        );
        assert_eq!(profile.consultant_fee.as_deref(), Some("1200.5"));
        assert!(lookup.token.is_none());
    }

    #[test]
    fn test_generated_avatar_uses_first_and_last_name() {
        let lookup = parse(r#"{"user": {"first_name": "Paul", "last_name": "Barber"}, "token": "  "}"#)
            .into_lookup("paul@corp.com");
        assert_eq!(
            lookup.profile.avatar,
            "https://ui-avatars.com/api/?name=Paul+Barber&background=0D8ABC&color=fff"
        );
        // Blank token counts as missing
        assert!(lookup.token.is_none());
    }

    #[test]
    fn test_notification_mapping() {
        let items: Vec<NotificationDto> = serde_json::from_str(
            r#"[
                {"id": 7, "title": "Bank details updated", "message": "Please confirm",
                 "notification_type": "ACTION_REQUIRED", "is_read": false,
                 "created_at": "2024-05-01T10:00:00Z"},
                {"id": 8, "title": "Payslip", "message": "May payslip is ready",
                 "notification_type": "INFO", "is_read": true, "created_at": "not a date"},
                {"id": 9, "title": "Wiki", "message": "New page", "type": "SOMETHING_NEW"}
            ]"#,
        )
        .unwrap();

        let notifications: Vec<Notification> = items.into_iter().map(Notification::from).collect();
        assert_eq!(notifications[0].id, NotificationId(7));
        assert!(notifications[0].is_actionable());
        assert!(notifications[0].created_at.is_some());

        assert_eq!(notifications[1].kind, NotificationKind::Info);
        assert!(notifications[1].is_read);
        assert!(notifications[1].created_at.is_none());

        assert_eq!(notifications[2].kind, NotificationKind::Info);
        assert!(!notifications[2].is_read);
    }

    #[test]
    fn test_mark_read_body() {
        let body = serde_json::to_value(MarkReadRequest { read: true }).unwrap();
        assert_eq!(body, serde_json::json!({ "read": true }));
    }
}
