//! Client-local backend. Keeps everything in process; used for the demo
//! mode and as the test double for the view layer.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{AuthBackend, CrisisBackend};
use crate::bob::BobBoard;
use crate::error::{BackendError, Operation};
use crate::model::{
    Activity, ActivityQuery, AuthUser, BobEntry, CrisisDocument, CrisisStatus, CrisisSummary,
    DocumentType, EntryType, NewActivity, NewBobEntry, ResponsibilityCard, Session,
    SignUpOutcome, UserProfile,
};
use crate::validation;
use crate::views;

#[derive(Debug, Default)]
struct MemoryState {
    board: BobBoard,
    crisis: Option<(String, String, CrisisStatus, DateTime<Utc>)>,
    activities: Vec<Activity>,
    cards: Vec<ResponsibilityCard>,
    documents: Vec<CrisisDocument>,
    user: Option<AuthUser>,
    profiles: Vec<UserProfile>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_crisis(&self, id: &str, name: &str, status: CrisisStatus, start_time: DateTime<Utc>) {
        self.lock().crisis = Some((id.to_string(), name.to_string(), status, start_time));
    }

    pub fn add_card(&self, role: &str, duties: &[&str], description: Option<&str>) -> String {
        let mut state = self.lock();
        let id = state.next_id("card");
        state.cards.push(ResponsibilityCard {
            id: id.clone(),
            role: role.to_string(),
            duties: duties.iter().map(ToString::to_string).collect(),
            description: description.map(ToString::to_string),
            created_at: Utc::now(),
        });
        id
    }

    pub fn add_document(&self, title: &str, doc_type: DocumentType, description: Option<&str>) -> String {
        let mut state = self.lock();
        let id = state.next_id("doc");
        let now = Utc::now();
        state.documents.push(CrisisDocument {
            id: id.clone(),
            title: title.to_string(),
            description: description.map(ToString::to_string),
            doc_type,
            content: None,
            file_url: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn board(&self) -> BobBoard {
        self.lock().board.clone()
    }

    pub fn profiles(&self) -> Vec<UserProfile> {
        self.lock().profiles.clone()
    }

    /// Backend preloaded with a running incident, a few cards, documents
    /// and a small linked board.
    pub fn demo() -> Self {
        let backend = Self::new();
        let now = Utc::now();
        backend.set_crisis(
            "crisis-demo",
            "Warehouse fire, north site",
            CrisisStatus::Active,
            now - Duration::minutes(135),
        );
        backend.add_card(
            "Crisis Manager",
            &["Chair the crisis team", "Approve external statements"],
            Some("Owns the overall response."),
        );
        backend.add_card(
            "Communications Lead",
            &["Draft press holding lines", "Brief staff every hour"],
            None,
        );
        backend.add_document("Site crisis plan", DocumentType::CrisisPlan, Some("Escalation levels and contacts"));
        backend.add_document("Evacuation procedure", DocumentType::Procedure, None);
        backend.add_document("Floor plans", DocumentType::Reference, Some("North site, all levels"));

        let mut state = backend.lock();
        let crisis_id = Some("crisis-demo".to_string());
        for (minutes_ago, description) in [
            (130, "Crisis opened by duty manager"),
            (95, "Fire brigade on site"),
            (20, "Staff headcount completed"),
        ] {
            let id = state.next_id("activity");
            state.activities.push(Activity {
                id,
                crisis_id: crisis_id.clone(),
                timestamp: now - Duration::minutes(minutes_ago),
                description: description.to_string(),
            });
        }
        let assessment = demo_entry(&mut state, &crisis_id, EntryType::Assessment, "Fire reported in storage hall B", &[]);
        let judgment = demo_entry(&mut state, &crisis_id, EntryType::Judgment, "Building unsafe until cleared", &[&assessment]);
        demo_entry(&mut state, &crisis_id, EntryType::Decision, "Keep site closed for the night shift", &[&assessment, &judgment]);
        drop(state);
        backend
    }
}

fn demo_entry(
    state: &mut MemoryState,
    crisis_id: &Option<String>,
    entry_type: EntryType,
    content: &str,
    linked_to: &[&String],
) -> String {
    let id = state.next_id("entry");
    let now = Utc::now();
    state.board.insert(BobEntry {
        id: id.clone(),
        crisis_id: crisis_id.clone(),
        user_id: "local-user".to_string(),
        entry_type,
        content: content.to_string(),
        created_at: now,
        updated_at: now,
        linked_to: linked_to.iter().map(|id| id.to_string()).collect(),
    });
    id
}

impl CrisisBackend for MemoryBackend {
    async fn current_crisis(&self) -> Result<Option<CrisisSummary>, BackendError> {
        let state = self.lock();
        Ok(state
            .crisis
            .as_ref()
            .filter(|(_, _, status, _)| *status != CrisisStatus::Closed)
            .map(|(id, name, status, start_time)| CrisisSummary {
                id: id.clone(),
                name: name.clone(),
                status: status.clone(),
                start_time: *start_time,
                duration: views::interval_text(*start_time, Utc::now()),
            }))
    }

    async fn activity_log(&self, query: &ActivityQuery) -> Result<Vec<Activity>, BackendError> {
        let state = self.lock();
        let mut rows: Vec<Activity> = state
            .activities
            .iter()
            .filter(|a| query.crisis_id.is_none() || a.crisis_id == query.crisis_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn create_activity(&self, activity: &NewActivity) -> Result<(), BackendError> {
        let description = validation::validate_activity_description(&activity.description)?;
        let mut state = self.lock();
        let id = state.next_id("activity");
        state.activities.push(Activity {
            id,
            crisis_id: activity.crisis_id.clone(),
            timestamp: activity.timestamp.unwrap_or_else(Utc::now),
            description,
        });
        Ok(())
    }

    async fn responsibility_cards(&self) -> Result<Vec<ResponsibilityCard>, BackendError> {
        let mut cards = self.lock().cards.clone();
        cards.sort_by(|a, b| a.role.cmp(&b.role));
        Ok(cards)
    }

    async fn documents(&self) -> Result<Vec<CrisisDocument>, BackendError> {
        let mut docs = self.lock().documents.clone();
        docs.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(docs)
    }

    async fn bob_entries(&self, crisis_id: Option<&str>) -> Result<Vec<BobEntry>, BackendError> {
        let state = self.lock();
        let mut entries: Vec<BobEntry> = state
            .board
            .entries()
            .iter()
            .filter(|e| crisis_id.is_none() || e.crisis_id.as_deref() == crisis_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn create_bob_entry(&self, entry: &NewBobEntry) -> Result<String, BackendError> {
        let content = validation::validate_entry_content(&entry.content)?;
        let mut state = self.lock();
        let user_id = state
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_else(|| "local-user".to_string());
        let id = state.next_id("entry");
        let now = Utc::now();
        state.board.insert(BobEntry {
            id: id.clone(),
            crisis_id: entry.crisis_id.clone(),
            user_id,
            entry_type: entry.entry_type,
            content,
            created_at: now,
            updated_at: now,
            linked_to: Vec::new(),
        });
        if !entry.linked_to.is_empty() {
            if let Err(source) = state.board.create_link(&id, entry.linked_to.as_slice()) {
                state.board.remove(&id);
                return Err(BackendError::Link {
                    operation: Operation::CreateBobEntry,
                    source,
                });
            }
        }
        Ok(id)
    }

    async fn update_bob_entry(&self, id: &str, content: &str) -> Result<(), BackendError> {
        let content = validation::validate_entry_content(content)?;
        let mut state = self.lock();
        let Some(mut entry) = state.board.get(id).cloned() else {
            return Err(BackendError::Remote {
                operation: Operation::UpdateBobEntry,
                status: 404,
                message: format!("entry {id} not found"),
            });
        };
        entry.content = content;
        entry.updated_at = Utc::now();
        state.board.insert(entry);
        Ok(())
    }

    async fn delete_bob_entry(&self, id: &str) -> Result<(), BackendError> {
        self.lock().board.remove(id);
        Ok(())
    }

    async fn create_bob_link(&self, from_id: &str, to_id: &str) -> Result<(), BackendError> {
        self.lock()
            .board
            .create_link(from_id, &[to_id])
            .map(|_| ())
            .map_err(|source| BackendError::Link {
                operation: Operation::CreateBobLink,
                source,
            })
    }

    async fn delete_bob_link(&self, from_id: &str, to_id: &str) -> Result<(), BackendError> {
        self.lock().board.remove_link(from_id, to_id);
        Ok(())
    }
}

impl AuthBackend for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Session, BackendError> {
        Ok(self.local_session(email))
    }

    async fn send_otp(&self, email: &str) -> Result<(), BackendError> {
        tracing::info!(%email, "local backend accepts any one-time code");
        Ok(())
    }

    async fn verify_otp(&self, email: &str, _code: &str) -> Result<Session, BackendError> {
        Ok(self.local_session(email))
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, BackendError> {
        Ok(SignUpOutcome::SignedIn(self.local_session(email)))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.lock().user = None;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.lock().user.clone())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), BackendError> {
        let mut state = self.lock();
        match state.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => state.profiles.push(profile.clone()),
        }
        Ok(())
    }
}

impl MemoryBackend {
    fn local_session(&self, email: &str) -> Session {
        let user = AuthUser {
            id: "local-user".to_string(),
            email: Some(email.to_string()),
            user_metadata: serde_json::json!({ "role": views::DEFAULT_ROLE }),
        };
        self.lock().user = Some(user.clone());
        Session {
            access_token: "local".to_string(),
            refresh_token: None,
            user,
        }
    }
}
