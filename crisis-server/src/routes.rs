use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use crisis_core::{ActivityQuery, AuthUser, BobLink, EntryType, NewActivity, NewBobEntry, UserProfile};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{Store, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub anon_key: Arc<str>,
}

impl AppState {
    pub fn new(store: Store, anon_key: &str) -> Self {
        Self {
            store,
            anon_key: Arc::from(anon_key),
        }
    }

    /// Checks the api key and resolves the bearer token. The anon key as
    /// bearer means an anonymous caller.
    fn caller(&self, headers: &HeaderMap) -> ApiResult<Option<AuthUser>> {
        match headers.get("apikey").and_then(|v| v.to_str().ok()) {
            None => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "No API key found in request")),
            Some(key) if key != &*self.anon_key => {
                return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid API key"));
            }
            Some(_) => {}
        }
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };
        if token == &*self.anon_key {
            return Ok(None);
        }
        match self.store.user_for_token(token)? {
            Some(user) => Ok(Some(user)),
            None => Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid JWT: session not found")),
        }
    }

    fn signed_in(&self, headers: &HeaderMap) -> ApiResult<AuthUser> {
        self.caller(headers)?
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Not authenticated"))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "message": self.message, "code": self.status.as_u16() });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::Validation(_)
            | StoreError::Link(_)
            | StoreError::InvalidCredentials
            | StoreError::InvalidOtp => StatusCode::BAD_REQUEST,
            StoreError::AlreadyRegistered | StoreError::UnknownAccount => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Sqlite(_) | StoreError::Io(_) | StoreError::Corrupt(_) => {
                tracing::error!("store failure: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, err.to_string())
    }
}

fn rows<T: Serialize>(value: T) -> ApiResult<Json<Value>> {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rest/v1/rpc/:name", post(call_rpc))
        .route("/rest/v1/bob_entries", patch(update_entry).delete(delete_entry))
        .route("/rest/v1/bob_links", post(create_link).delete(delete_link))
        .route("/rest/v1/activities", post(create_activity))
        .route("/rest/v1/users", post(upsert_user))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/otp", post(send_otp))
        .route("/auth/v1/verify", post(verify))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/user", get(current_user))
        .with_state(state)
}

async fn call_rpc(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    let caller = state.caller(&headers)?;
    let text = |key: &str| args.get(key).and_then(Value::as_str).map(ToString::to_string);
    tracing::debug!(rpc = %name, "rpc call");

    match name.as_str() {
        "get_current_crisis" => {
            let crisis = state.store.current_crisis(Utc::now())?;
            rows(crisis.into_iter().collect::<Vec<_>>())
        }
        "get_activity_log" => {
            let query = ActivityQuery {
                crisis_id: text("p_crisis_id"),
                limit: uint_arg(&args, "p_limit").unwrap_or(ActivityQuery::default().limit),
                offset: uint_arg(&args, "p_offset").unwrap_or(0),
            };
            rows(state.store.activity_log(&query)?)
        }
        "get_responsibility_cards" => rows(state.store.responsibility_cards()?),
        "get_documents" => rows(state.store.documents()?),
        "get_bob_entries" => rows(state.store.bob_entries(text("p_crisis_id").as_deref())?),
        "create_bob_entry_with_links" => {
            let user = caller.ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Not authenticated"))?;
            let entry_type: EntryType = text("p_type")
                .unwrap_or_default()
                .parse()
                .map_err(|e: crisis_core::ValidationError| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
            let linked_to = args
                .get("p_linked_to")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(|v| v.as_str().map(ToString::to_string)).collect())
                .unwrap_or_default();
            let entry = NewBobEntry {
                crisis_id: text("p_crisis_id"),
                entry_type,
                content: text("p_content").unwrap_or_default(),
                linked_to,
            };
            let id = state.store.create_bob_entry(&user.id, &entry)?;
            Ok(Json(json!(id)))
        }
        other => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Could not find the function public.{other} in the schema cache"),
        )),
    }
}

fn uint_arg(args: &Value, key: &str) -> Option<u32> {
    args.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

/// Value of a PostgREST `col=eq.value` filter.
fn eq_filter<'a>(params: &'a HashMap<String, String>, column: &str) -> ApiResult<&'a str> {
    params
        .get(column)
        .and_then(|v| v.strip_prefix("eq."))
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, format!("missing filter {column}=eq.<value>")))
}

#[derive(Deserialize)]
struct ContentPatch {
    content: String,
}

async fn update_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(patch): Json<ContentPatch>,
) -> ApiResult<StatusCode> {
    state.signed_in(&headers)?;
    state
        .store
        .update_bob_entry(eq_filter(&params, "id")?, &patch.content)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<StatusCode> {
    state.signed_in(&headers)?;
    state.store.delete_bob_entry(eq_filter(&params, "id")?)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(link): Json<BobLink>,
) -> ApiResult<StatusCode> {
    let user = state.signed_in(&headers)?;
    if link.created_by != user.id {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "created_by must be the signed-in user",
        ));
    }
    state
        .store
        .create_bob_link(&link.from_entry_id, &link.to_entry_id, &user.id)?;
    Ok(StatusCode::CREATED)
}

async fn delete_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<StatusCode> {
    state.signed_in(&headers)?;
    state.store.delete_bob_link(
        eq_filter(&params, "from_entry_id")?,
        eq_filter(&params, "to_entry_id")?,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(activity): Json<NewActivity>,
) -> ApiResult<StatusCode> {
    state.signed_in(&headers)?;
    state.store.insert_activity(&activity)?;
    Ok(StatusCode::CREATED)
}

async fn upsert_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(profile): Json<UserProfile>,
) -> ApiResult<StatusCode> {
    let user = state.signed_in(&headers)?;
    if profile.id != user.id {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "profiles can only be written by their owner",
        ));
    }
    state.store.upsert_profile(&profile)?;
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct OtpRequest {
    email: String,
    #[serde(default = "default_true")]
    create_user: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct VerifyRequest {
    email: String,
    token: String,
    #[serde(rename = "type")]
    kind: String,
}

async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<Value>> {
    state.caller(&headers)?;
    if params.get("grant_type").map(String::as_str) != Some("password") {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "unsupported grant_type"));
    }
    let session = state
        .store
        .sign_in_with_password(&credentials.email, &credentials.password)?;
    rows(session)
}

async fn send_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OtpRequest>,
) -> ApiResult<Json<Value>> {
    state.caller(&headers)?;
    let code = state.store.issue_otp(&request.email, request.create_user)?;
    tracing::info!(email = %request.email.trim(), %code, "one-time code issued");
    Ok(Json(json!({})))
}

async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<Value>> {
    state.caller(&headers)?;
    if request.kind != "email" {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("unsupported verification type '{}'", request.kind),
        ));
    }
    rows(state.store.verify_otp(&request.email, &request.token)?)
}

async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<Value>> {
    state.caller(&headers)?;
    if let Some(redirect) = params.get("redirect_to") {
        tracing::debug!(%redirect, "sign-up confirmation skipped; accounts are confirmed on creation");
    }
    rows(state.store.sign_up(&credentials.email, &credentials.password)?)
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<StatusCode> {
    state.signed_in(&headers)?;
    if let Some(token) = bearer_token(&headers) {
        state.store.sign_out(token)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    rows(state.signed_in(&headers)?)
}
