//! Pure derivations the dashboard and reference views render from.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::model::{CrisisDocument, CrisisStatus, DocumentType, ResponsibilityCard};

pub const DASHBOARD_ACTIVITY_LIMIT: u32 = 20;
pub const DEFAULT_ROLE: &str = "Crisis Manager";

pub const CRISIS_LOAD_FAILED: &str = "Failed to load crisis information";
pub const ACTIVITY_LOAD_FAILED: &str = "Failed to load activity log";
pub const NO_ACTIVE_CRISIS: &str = "No active crisis";
pub const NO_ACTIVITIES: &str = "No activities recorded";

fn interval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+):(\d+):(\d+)").expect("interval pattern is valid"))
}

/// Renders backend interval text (`HH:MM:SS`, possibly prefixed with days)
/// as "2h 15m" or "45m". Text that does not look like an interval is
/// returned unchanged.
pub fn format_interval(interval: &str) -> String {
    if interval.trim().is_empty() {
        return "0 minutes".to_string();
    }
    let Some(caps) = interval_pattern().captures(interval) else {
        return interval.to_string();
    };
    let hours: u64 = caps[1].parse().unwrap_or(0);
    let minutes: u64 = caps[2].parse().unwrap_or(0);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Elapsed time as `HH:MM:SS`, hours unbounded.
pub fn interval_text(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - start).num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - ts;
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = elapsed.num_days();
    if days < 7 {
        return format!("{days}d ago");
    }
    calendar_date(ts)
}

pub fn calendar_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

pub fn full_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d at %H:%M:%S").to_string()
}

/// Colour family of a crisis status badge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Danger,
    Warning,
    Success,
    Neutral,
}

impl Tone {
    pub fn css_class(self) -> &'static str {
        match self {
            Tone::Danger => "badge badge-danger",
            Tone::Warning => "badge badge-warning",
            Tone::Success => "badge badge-success",
            Tone::Neutral => "badge",
        }
    }
}

pub fn status_tone(status: &CrisisStatus) -> Tone {
    match status {
        CrisisStatus::Active => Tone::Danger,
        CrisisStatus::Monitoring => Tone::Warning,
        CrisisStatus::Closed => Tone::Success,
        CrisisStatus::Unknown => Tone::Neutral,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentGroup {
    pub doc_type: DocumentType,
    pub label: String,
    pub documents: Vec<CrisisDocument>,
}

/// Groups documents in library order. Empty groups are dropped and
/// documents of unrecognised type are left out.
pub fn group_documents(documents: &[CrisisDocument]) -> Vec<DocumentGroup> {
    DocumentType::GROUP_ORDER
        .into_iter()
        .filter_map(|doc_type| {
            let documents: Vec<CrisisDocument> = documents
                .iter()
                .filter(|doc| doc.doc_type == doc_type)
                .cloned()
                .collect();
            (!documents.is_empty()).then(|| DocumentGroup {
                doc_type,
                label: doc_type.label().to_string(),
                documents,
            })
        })
        .collect()
}

/// Group header suffix, e.g. "(2 documents)".
pub fn document_count(count: usize) -> String {
    if count == 1 {
        "(1 document)".to_string()
    } else {
        format!("({count} documents)")
    }
}

pub fn is_current_user_role(card: &ResponsibilityCard, user_role: Option<&str>) -> bool {
    card.role == user_role.unwrap_or(DEFAULT_ROLE)
}

/// State of a view that is fed by one fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum LoadState<T> {
    Loading,
    Failed(String),
    Ready(T),
}

impl<T> LoadState<T> {
    /// Keeps the data or replaces the backend error with the view's own
    /// message. The backend error goes to the log.
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>, fallback: &str) -> Self {
        match result {
            Ok(value) => LoadState::Ready(value),
            Err(err) => {
                tracing::warn!("{fallback}: {err}");
                LoadState::Failed(fallback.to_string())
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadState<U> {
        match self {
            LoadState::Loading => LoadState::Loading,
            LoadState::Failed(message) => LoadState::Failed(message),
            LoadState::Ready(value) => LoadState::Ready(f(value)),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Page {
    #[default]
    Dashboard,
    Bob,
    ResponsibilityCards,
    Documents,
}

impl Page {
    pub const ALL: [Page; 4] = [
        Page::Dashboard,
        Page::Bob,
        Page::ResponsibilityCards,
        Page::Documents,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Bob => "BOB Model",
            Page::ResponsibilityCards => "Responsibility Cards",
            Page::Documents => "Documents",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Page::Dashboard => "/dashboard",
            Page::Bob => "/bob",
            Page::ResponsibilityCards => "/responsibility-cards",
            Page::Documents => "/documents",
        }
    }

    pub fn from_path(path: &str) -> Option<Page> {
        let path = path.trim_end_matches('/');
        Page::ALL.into_iter().find(|page| page.path() == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).single().expect("valid time")
    }

    fn doc(id: &str, doc_type: DocumentType) -> CrisisDocument {
        CrisisDocument {
            id: id.into(),
            title: format!("doc {id}"),
            description: None,
            doc_type,
            content: None,
            file_url: None,
            created_at: at(8, 0),
            updated_at: at(8, 0),
        }
    }

    #[test]
    fn interval_formatting() {
        assert_eq!(format_interval(""), "0 minutes");
        assert_eq!(format_interval("02:15:00"), "2h 15m");
        assert_eq!(format_interval("00:45:10"), "45m");
        assert_eq!(format_interval("1 day 03:05:00"), "3h 5m");
        assert_eq!(format_interval("soon"), "soon");
    }

    #[test]
    fn interval_text_pads_and_clamps() {
        assert_eq!(interval_text(at(8, 0), at(10, 15)), "02:15:00");
        assert_eq!(interval_text(at(10, 0), at(8, 0)), "00:00:00");
        assert_eq!(format_interval(&interval_text(at(8, 0), at(8, 45))), "45m");
    }

    #[test]
    fn relative_time_buckets() {
        let now = at(12, 0);
        assert_eq!(relative_time(now - Duration::seconds(30), now), "Just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(relative_time(now - Duration::days(9), now), "2024-03-01");
        assert_eq!(full_timestamp(now), "2024-03-10 at 12:00:00");
    }

    #[test]
    fn documents_group_in_library_order() {
        let docs = vec![
            doc("r1", DocumentType::Reference),
            doc("x1", DocumentType::Other),
            doc("c1", DocumentType::CrisisPlan),
            doc("r2", DocumentType::Reference),
        ];
        let groups = group_documents(&docs);
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, ["Crisis Plan", "Reference"]);
        assert_eq!(groups[1].documents.len(), 2);
        assert_eq!(document_count(groups[0].documents.len()), "(1 document)");
        assert_eq!(document_count(groups[1].documents.len()), "(2 documents)");
        assert!(group_documents(&[]).is_empty());
    }

    #[test]
    fn role_highlight_defaults_to_crisis_manager() {
        let card = ResponsibilityCard {
            id: "c1".into(),
            role: "Crisis Manager".into(),
            duties: vec![],
            description: None,
            created_at: at(8, 0),
        };
        assert!(is_current_user_role(&card, None));
        assert!(!is_current_user_role(&card, Some("Logistics Lead")));
    }

    #[test]
    fn load_state_hides_backend_detail() {
        let state: LoadState<u32> = LoadState::from_result(Err("timeout"), CRISIS_LOAD_FAILED);
        assert_eq!(state.error(), Some(CRISIS_LOAD_FAILED));
        assert_eq!(LoadState::from_result(Ok::<_, String>(3), "x").ready(), Some(&3));
    }

    #[test]
    fn pages_resolve_from_paths() {
        assert_eq!(Page::from_path("/bob/"), Some(Page::Bob));
        assert_eq!(Page::from_path("/nope"), None);
        assert_eq!(status_tone(&CrisisStatus::Active), Tone::Danger);
    }
}
