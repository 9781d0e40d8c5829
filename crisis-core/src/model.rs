use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Column of the BOB board an entry belongs to.
///
/// Variants are declared in layer order, so the derived `Ord` is the
/// linking order: an entry may only point at entries of a strictly lower
/// layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Assessment,
    Judgment,
    Decision,
}

impl EntryType {
    pub const ALL: [EntryType; 3] = [EntryType::Assessment, EntryType::Judgment, EntryType::Decision];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Assessment => "assessment",
            EntryType::Judgment => "judgment",
            EntryType::Decision => "decision",
        }
    }

    pub fn can_link_to(self, target: EntryType) -> bool {
        target < self
    }

    /// Target types in the order the link dialog lists them.
    pub fn permitted_targets(self) -> &'static [EntryType] {
        match self {
            EntryType::Assessment => &[],
            EntryType::Judgment => &[EntryType::Assessment],
            EntryType::Decision => &[EntryType::Assessment, EntryType::Judgment],
        }
    }

    pub fn column_title(self) -> &'static str {
        match self {
            EntryType::Assessment => "Situation Assessment",
            EntryType::Judgment => "Judgment",
            EntryType::Decision => "Decision",
        }
    }

    pub fn dialog_title(self) -> &'static str {
        match self {
            EntryType::Assessment => "Add Situation Assessment",
            EntryType::Judgment => "Add Judgment",
            EntryType::Decision => "Add Decision",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assessment" => Ok(EntryType::Assessment),
            "judgment" | "judgement" => Ok(EntryType::Judgment),
            "decision" => Ok(EntryType::Decision),
            other => Err(ValidationError::UnknownEntryType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BobEntry {
    pub id: String,
    #[serde(default)]
    pub crisis_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub linked_to: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BobLink {
    pub from_entry_id: String,
    pub to_entry_id: String,
    pub created_by: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBobEntry {
    pub crisis_id: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content: String,
    #[serde(default)]
    pub linked_to: Vec<String>,
}

impl NewBobEntry {
    pub fn new(entry_type: EntryType, content: impl Into<String>) -> Self {
        Self {
            crisis_id: None,
            entry_type,
            content: content.into(),
            linked_to: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrisisStatus {
    Active,
    Monitoring,
    Closed,
    #[serde(other)]
    Unknown,
}

impl CrisisStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CrisisStatus::Active => "Active",
            CrisisStatus::Monitoring => "Monitoring",
            CrisisStatus::Closed => "Closed",
            CrisisStatus::Unknown => "Unknown",
        }
    }
}

/// Row of `get_current_crisis`. `duration` is the backend's interval text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisSummary {
    pub id: String,
    pub name: String,
    pub status: CrisisStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(default)]
    pub crisis_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActivity {
    pub crisis_id: Option<String>,
    pub description: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityQuery {
    pub crisis_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            crisis_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl ActivityQuery {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibilityCard {
    pub id: String,
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duties: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    CrisisPlan,
    Procedure,
    #[default]
    Reference,
    #[serde(other)]
    Other,
}

impl DocumentType {
    /// Display order of the document library groups.
    pub const GROUP_ORDER: [DocumentType; 3] = [
        DocumentType::CrisisPlan,
        DocumentType::Procedure,
        DocumentType::Reference,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DocumentType::CrisisPlan => "Crisis Plan",
            DocumentType::Procedure => "Procedure",
            DocumentType::Reference => "Reference",
            DocumentType::Other => "Other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisDocument {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub doc_type: DocumentType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrisisDocument {
    pub fn was_updated(&self) -> bool {
        self.updated_at != self.created_at
    }
}

/// Row of the `users` profile table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

impl UserProfile {
    /// Profile row for an authenticated user. `fallback_email` is used when
    /// the auth record carries no address (e.g. phone sign-ups).
    pub fn from_auth_user(user: &AuthUser, fallback_email: &str) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone().unwrap_or_else(|| fallback_email.to_string()),
            full_name: user.metadata_str("full_name"),
            role: user.metadata_str("role"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.user_metadata
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationRequired,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layering_only_points_downward() {
        assert!(EntryType::Judgment.can_link_to(EntryType::Assessment));
        assert!(EntryType::Decision.can_link_to(EntryType::Assessment));
        assert!(EntryType::Decision.can_link_to(EntryType::Judgment));
        assert!(!EntryType::Assessment.can_link_to(EntryType::Assessment));
        assert!(!EntryType::Judgment.can_link_to(EntryType::Decision));
        assert!(!EntryType::Judgment.can_link_to(EntryType::Judgment));
        for source in EntryType::ALL {
            for target in source.permitted_targets() {
                assert!(source.can_link_to(*target));
            }
        }
    }

    #[test]
    fn entry_decodes_null_links_and_type_field() {
        let raw = serde_json::json!({
            "id": "e1",
            "crisis_id": null,
            "user_id": "u1",
            "type": "judgment",
            "content": "Building unsafe",
            "created_at": "2024-03-01T10:00:00+00:00",
            "updated_at": "2024-03-01T10:00:00+00:00",
            "linked_to": null
        });
        let entry: BobEntry = serde_json::from_value(raw).expect("decode");
        assert_eq!(entry.entry_type, EntryType::Judgment);
        assert!(entry.linked_to.is_empty());
    }

    #[test]
    fn documents_default_missing_type_to_reference() {
        let raw = serde_json::json!({
            "id": "d1",
            "title": "Evacuation map",
            "type": null,
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z"
        });
        let doc: CrisisDocument = serde_json::from_value(raw).expect("decode");
        assert_eq!(doc.doc_type, DocumentType::Reference);
        assert!(!doc.was_updated());

        let odd: DocumentType = serde_json::from_str("\"Memo\"").expect("decode");
        assert_eq!(odd, DocumentType::Other);
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let status: CrisisStatus = serde_json::from_str("\"Escalated\"").expect("decode");
        assert_eq!(status, CrisisStatus::Unknown);
    }

    #[test]
    fn profile_prefers_auth_email_and_reads_metadata() {
        let user = AuthUser {
            id: "u1".into(),
            email: None,
            user_metadata: serde_json::json!({"full_name": "Ada", "role": "Crisis Manager"}),
        };
        let profile = UserProfile::from_auth_user(&user, "ada@example.org");
        assert_eq!(profile.email, "ada@example.org");
        assert_eq!(profile.full_name.as_deref(), Some("Ada"));
        assert_eq!(profile.role.as_deref(), Some("Crisis Manager"));
    }

    #[test]
    fn entry_type_parses_loosely() {
        assert_eq!("Decision".parse::<EntryType>().ok(), Some(EntryType::Decision));
        assert!("memo".parse::<EntryType>().is_err());
    }
}
