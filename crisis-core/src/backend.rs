//! Backend surface shared by the hosted client and the in-memory backend,
//! plus the user flows built on top of it.
#![allow(async_fn_in_trait)]

use crate::bob::BobBoard;
use crate::error::{BackendError, Operation};
use crate::model::{
    Activity, ActivityQuery, AuthUser, BobEntry, CrisisDocument, CrisisSummary, EntryType,
    NewActivity, NewBobEntry, ResponsibilityCard, Session, SignUpOutcome, UserProfile,
};
use crate::validation;

/// RPC and table calls behind the dashboard, reference views and BOB board.
pub trait CrisisBackend {
    async fn current_crisis(&self) -> Result<Option<CrisisSummary>, BackendError>;
    async fn activity_log(&self, query: &ActivityQuery) -> Result<Vec<Activity>, BackendError>;
    async fn create_activity(&self, activity: &NewActivity) -> Result<(), BackendError>;
    async fn responsibility_cards(&self) -> Result<Vec<ResponsibilityCard>, BackendError>;
    async fn documents(&self) -> Result<Vec<CrisisDocument>, BackendError>;
    async fn bob_entries(&self, crisis_id: Option<&str>) -> Result<Vec<BobEntry>, BackendError>;
    /// Returns the id of the new entry.
    async fn create_bob_entry(&self, entry: &NewBobEntry) -> Result<String, BackendError>;
    async fn update_bob_entry(&self, id: &str, content: &str) -> Result<(), BackendError>;
    async fn delete_bob_entry(&self, id: &str) -> Result<(), BackendError>;
    /// Idempotent per `(from_id, to_id)` pair.
    async fn create_bob_link(&self, from_id: &str, to_id: &str) -> Result<(), BackendError>;
    async fn delete_bob_link(&self, from_id: &str, to_id: &str) -> Result<(), BackendError>;
}

pub trait AuthBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;
    /// Sends a one-time code, creating the account when it does not exist.
    async fn send_otp(&self, email: &str) -> Result<(), BackendError>;
    async fn verify_otp(&self, email: &str, code: &str) -> Result<Session, BackendError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError>;
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), BackendError>;
}

/// Makes sure the signed-in user has a profile row. Failures are logged and
/// swallowed: the row is re-attempted on the next sign-in.
pub async fn ensure_profile<A: AuthBackend>(auth: &A, fallback_email: &str) {
    let user = match auth.current_user().await {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!("skipping profile upsert: {err}");
            return;
        }
    };
    let profile = UserProfile::from_auth_user(&user, fallback_email);
    if let Err(err) = auth.upsert_profile(&profile).await {
        tracing::warn!(user_id = %profile.id, "profile upsert failed: {err}");
    }
}

pub async fn sign_in<A: AuthBackend>(auth: &A, email: &str, password: &str) -> Result<Session, BackendError> {
    let email = email.trim();
    let session = auth.sign_in_with_password(email, password).await?;
    ensure_profile(auth, email).await;
    tracing::info!(user_id = %session.user.id, "signed in with password");
    Ok(session)
}

pub async fn request_code<A: AuthBackend>(auth: &A, email: &str) -> Result<String, BackendError> {
    let email = validation::validate_email(email)?;
    auth.send_otp(&email).await?;
    Ok(email)
}

pub async fn sign_in_with_code<A: AuthBackend>(
    auth: &A,
    email: &str,
    code: &str,
) -> Result<Session, BackendError> {
    let (email, code) = validation::validate_otp(email, code)?;
    let session = auth.verify_otp(&email, &code).await?;
    ensure_profile(auth, &email).await;
    tracing::info!(user_id = %session.user.id, "signed in with one-time code");
    Ok(session)
}

pub async fn register<A: AuthBackend>(
    auth: &A,
    email: &str,
    password: &str,
) -> Result<SignUpOutcome, BackendError> {
    let email = validation::validate_sign_up(email, password)?;
    let outcome = auth.sign_up(&email, password).await?;
    if matches!(outcome, SignUpOutcome::SignedIn(_)) {
        ensure_profile(auth, &email).await;
    }
    Ok(outcome)
}

pub async fn load_board<B: CrisisBackend>(
    backend: &B,
    crisis_id: Option<&str>,
) -> Result<BobBoard, BackendError> {
    let entries = backend.bob_entries(crisis_id).await?;
    Ok(BobBoard::from_entries(entries))
}

/// Validates and stores a new entry, then reloads the board so ids and
/// links come from the backend.
pub async fn add_entry<B: CrisisBackend>(
    backend: &B,
    crisis_id: Option<&str>,
    entry_type: EntryType,
    content: &str,
) -> Result<BobBoard, BackendError> {
    let content = validation::validate_entry_content(content)?;
    let entry = NewBobEntry {
        crisis_id: crisis_id.map(ToString::to_string),
        entry_type,
        content,
        linked_to: Vec::new(),
    };
    let id = backend.create_bob_entry(&entry).await?;
    tracing::debug!(%id, %entry_type, "created bob entry");
    load_board(backend, crisis_id).await
}

/// Links `from_id` to `targets` after checking the layering rule against
/// `board`. Only edges missing from `board` are sent; an empty selection is
/// a no-op that returns the board unchanged.
pub async fn link_entries<B: CrisisBackend>(
    backend: &B,
    board: &BobBoard,
    crisis_id: Option<&str>,
    from_id: &str,
    targets: &[String],
) -> Result<BobBoard, BackendError> {
    if targets.is_empty() {
        return Ok(board.clone());
    }
    let mut preview = board.clone();
    let added = preview
        .create_link(from_id, targets)
        .map_err(|source| BackendError::Link {
            operation: Operation::CreateBobLink,
            source,
        })?;
    for to_id in &added {
        backend.create_bob_link(from_id, to_id).await?;
    }
    tracing::debug!(%from_id, added = added.len(), "linked bob entries");
    load_board(backend, crisis_id).await
}
