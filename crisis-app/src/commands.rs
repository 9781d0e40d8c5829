use chrono::{DateTime, Utc};
use crisis_core::backend::{self, CrisisBackend};
use crisis_core::views::{self, LoadState, Tone};
use crisis_core::{
    Activity, ActivityQuery, BackendError, BoardColumn, CrisisDocument, CrisisSummary, EntryType,
    ResponsibilityCard,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Clone, Debug, Serialize)]
pub struct CrisisDto {
    pub id: String,
    pub name: String,
    pub status: String,
    pub tone: Tone,
    pub started_at: String,
    pub duration: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityDto {
    pub id: String,
    pub description: String,
    pub relative_time: String,
    pub timestamp: String,
}

/// `crisis` is ready with `None` when nothing is running; `activities`
/// is ready and empty when nothing was logged yet.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardDto {
    pub crisis: LoadState<Option<CrisisDto>>,
    pub activities: LoadState<Vec<ActivityDto>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CardDto {
    pub id: String,
    pub role: String,
    pub description: Option<String>,
    pub duties: Vec<String>,
    pub is_your_role: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentDto {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub created: String,
    pub updated: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentGroupDto {
    pub label: String,
    pub count: String,
    pub documents: Vec<DocumentDto>,
}

fn crisis_dto(crisis: &CrisisSummary) -> CrisisDto {
    CrisisDto {
        id: crisis.id.clone(),
        name: crisis.name.clone(),
        status: crisis.status.label().to_string(),
        tone: views::status_tone(&crisis.status),
        started_at: views::full_timestamp(crisis.start_time),
        duration: views::format_interval(&crisis.duration),
    }
}

fn activity_dto(activity: &Activity, now: DateTime<Utc>) -> ActivityDto {
    ActivityDto {
        id: activity.id.clone(),
        description: activity.description.clone(),
        relative_time: views::relative_time(activity.timestamp, now),
        timestamp: views::full_timestamp(activity.timestamp),
    }
}

fn card_dto(card: &ResponsibilityCard, signed_in: bool, user_role: Option<&str>) -> CardDto {
    CardDto {
        id: card.id.clone(),
        role: card.role.clone(),
        description: card.description.clone(),
        duties: card.duties.clone(),
        is_your_role: signed_in && views::is_current_user_role(card, user_role),
    }
}

fn document_dto(document: &CrisisDocument) -> DocumentDto {
    DocumentDto {
        id: document.id.clone(),
        title: document.title.clone(),
        description: document.description.clone(),
        file_url: document.file_url.clone(),
        created: views::calendar_date(document.created_at),
        updated: document
            .was_updated()
            .then(|| views::calendar_date(document.updated_at)),
    }
}

/// Current crisis and the latest activities across all crises. The two
/// halves load and fail independently.
pub async fn dashboard<B: CrisisBackend>(state: &AppState<B>, now: DateTime<Utc>) -> DashboardDto {
    let query = ActivityQuery::with_limit(views::DASHBOARD_ACTIVITY_LIMIT);
    let (crisis, activities) = tokio::join!(state.backend.current_crisis(), state.backend.activity_log(&query));
    let crisis = LoadState::from_result(crisis, views::CRISIS_LOAD_FAILED);
    let activities = LoadState::from_result(activities, views::ACTIVITY_LOAD_FAILED);

    DashboardDto {
        crisis: crisis.map(|c| c.as_ref().map(crisis_dto)),
        activities: activities.map(|rows| rows.iter().map(|a| activity_dto(a, now)).collect()),
    }
}

pub async fn board<B: CrisisBackend>(state: &AppState<B>) -> Result<Vec<BoardColumn>, BackendError> {
    let board = backend::load_board(&state.backend, state.crisis()).await?;
    Ok(board.columns())
}

pub async fn add_entry<B: CrisisBackend>(
    state: &AppState<B>,
    entry_type: EntryType,
    content: &str,
) -> Result<Vec<BoardColumn>, BackendError> {
    let board = backend::add_entry(&state.backend, state.crisis(), entry_type, content).await?;
    Ok(board.columns())
}

pub async fn link_entries<B: CrisisBackend>(
    state: &AppState<B>,
    from_id: &str,
    targets: &[String],
) -> Result<Vec<BoardColumn>, BackendError> {
    let board = backend::load_board(&state.backend, state.crisis()).await?;
    let board = backend::link_entries(&state.backend, &board, state.crisis(), from_id, targets).await?;
    Ok(board.columns())
}

pub async fn responsibility_cards<B: CrisisBackend>(state: &AppState<B>) -> Result<Vec<CardDto>, BackendError> {
    let cards = state.backend.responsibility_cards().await?;
    let role = state.user_role.as_deref();
    Ok(cards
        .iter()
        .map(|card| card_dto(card, state.signed_in, role))
        .collect())
}

pub async fn documents<B: CrisisBackend>(state: &AppState<B>) -> Result<Vec<DocumentGroupDto>, BackendError> {
    let documents = state.backend.documents().await?;
    Ok(views::group_documents(&documents)
        .into_iter()
        .map(|group| DocumentGroupDto {
            count: views::document_count(group.documents.len()),
            label: group.label,
            documents: group.documents.iter().map(document_dto).collect(),
        })
        .collect())
}
