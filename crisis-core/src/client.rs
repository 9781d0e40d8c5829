//! HTTP client for the hosted backend (PostgREST tables and RPCs under
//! `/rest/v1`, auth under `/auth/v1`). `crisis-server` speaks the same
//! surface.

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{AuthBackend, CrisisBackend};
use crate::error::{BackendError, Operation};
use crate::model::{
    Activity, ActivityQuery, AuthUser, BobEntry, CrisisDocument, CrisisSummary, NewActivity,
    NewBobEntry, ResponsibilityCard, Session, SignUpOutcome, UserProfile,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    /// Where confirmation links in sign-up mails point.
    #[serde(default)]
    pub redirect_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HostedClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    redirect_url: Option<String>,
    session: Arc<Mutex<Option<Session>>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RowOrRows<T> {
    Rows(Vec<T>),
    Row(T),
}

impl<T> RowOrRows<T> {
    fn first(self) -> Option<T> {
        match self {
            RowOrRows::Rows(rows) => rows.into_iter().next(),
            RowOrRows::Row(row) => Some(row),
        }
    }
}

impl HostedClient {
    pub fn new(config: &BackendConfig) -> Result<Self, url::ParseError> {
        let parsed = url::Url::parse(&config.url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            redirect_url: config.redirect_url.clone(),
            session: Arc::new(Mutex::new(None)),
        })
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Restores or clears the session, e.g. from browser storage.
    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}/{}", self.base_url, path);
        if !query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            url.push('?');
            url.push_str(&encoded);
        }
        url
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let bearer = self
            .session()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, operation: Operation, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|source| BackendError::Transport { operation, source })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .or_else(|| status.canonical_reason().map(ToString::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        tracing::warn!(%operation, status = status.as_u16(), "backend call failed: {message}");
        Err(BackendError::Remote {
            operation,
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(operation: Operation, response: Response) -> Result<T, BackendError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { operation, source })?;
        serde_json::from_slice(&bytes).map_err(|err| BackendError::Decode {
            operation,
            detail: err.to_string(),
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, operation: Operation, name: &str, args: Value) -> Result<T, BackendError> {
        let url = self.url(&format!("rest/v1/rpc/{name}"), &[]);
        let response = self.send(operation, self.request(Method::POST, url).json(&args)).await?;
        Self::decode(operation, response).await
    }

    async fn session_call(&self, operation: Operation, path: &str, query: &[(&str, &str)], body: Value) -> Result<Session, BackendError> {
        let url = self.url(path, query);
        let response = self.send(operation, self.request(Method::POST, url).json(&body)).await?;
        let session: Session = Self::decode(operation, response).await?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn require_user(&self, operation: Operation) -> Result<AuthUser, BackendError> {
        self.current_user()
            .await?
            .ok_or(BackendError::NotAuthenticated { operation })
    }
}

impl CrisisBackend for HostedClient {
    async fn current_crisis(&self) -> Result<Option<CrisisSummary>, BackendError> {
        let rows: Option<RowOrRows<CrisisSummary>> = self
            .rpc(Operation::GetCurrentCrisis, "get_current_crisis", json!({}))
            .await?;
        Ok(rows.and_then(RowOrRows::first))
    }

    async fn activity_log(&self, query: &ActivityQuery) -> Result<Vec<Activity>, BackendError> {
        let mut args = json!({ "p_limit": query.limit, "p_offset": query.offset });
        if let Some(crisis_id) = &query.crisis_id {
            args["p_crisis_id"] = json!(crisis_id);
        }
        let rows: Option<Vec<Activity>> = self
            .rpc(Operation::GetActivityLog, "get_activity_log", args)
            .await?;
        Ok(rows.unwrap_or_default())
    }

    async fn create_activity(&self, activity: &NewActivity) -> Result<(), BackendError> {
        let operation = Operation::CreateActivity;
        let body = json!({
            "crisis_id": activity.crisis_id,
            "description": activity.description,
            "timestamp": activity.timestamp.unwrap_or_else(chrono::Utc::now),
        });
        let url = self.url("rest/v1/activities", &[]);
        self.send(operation, self.request(Method::POST, url).json(&body))
            .await?;
        Ok(())
    }

    async fn responsibility_cards(&self) -> Result<Vec<ResponsibilityCard>, BackendError> {
        let rows: Option<Vec<ResponsibilityCard>> = self
            .rpc(Operation::FetchResponsibilityCards, "get_responsibility_cards", json!({}))
            .await?;
        Ok(rows.unwrap_or_default())
    }

    async fn documents(&self) -> Result<Vec<CrisisDocument>, BackendError> {
        let rows: Option<Vec<CrisisDocument>> = self
            .rpc(Operation::FetchDocuments, "get_documents", json!({}))
            .await?;
        Ok(rows.unwrap_or_default())
    }

    async fn bob_entries(&self, crisis_id: Option<&str>) -> Result<Vec<BobEntry>, BackendError> {
        let rows: Option<Vec<BobEntry>> = self
            .rpc(Operation::FetchBobEntries, "get_bob_entries", json!({ "p_crisis_id": crisis_id }))
            .await?;
        Ok(rows.unwrap_or_default())
    }

    async fn create_bob_entry(&self, entry: &NewBobEntry) -> Result<String, BackendError> {
        let args = json!({
            "p_crisis_id": entry.crisis_id,
            "p_type": entry.entry_type,
            "p_content": entry.content,
            "p_linked_to": entry.linked_to,
        });
        self.rpc(Operation::CreateBobEntry, "create_bob_entry_with_links", args)
            .await
    }

    async fn update_bob_entry(&self, id: &str, content: &str) -> Result<(), BackendError> {
        let filter = format!("eq.{id}");
        let url = self.url("rest/v1/bob_entries", &[("id", filter.as_str())]);
        let builder = self
            .request(Method::PATCH, url)
            .json(&json!({ "content": content }));
        self.send(Operation::UpdateBobEntry, builder).await?;
        Ok(())
    }

    async fn delete_bob_entry(&self, id: &str) -> Result<(), BackendError> {
        let filter = format!("eq.{id}");
        let url = self.url("rest/v1/bob_entries", &[("id", filter.as_str())]);
        self.send(Operation::DeleteBobEntry, self.request(Method::DELETE, url))
            .await?;
        Ok(())
    }

    async fn create_bob_link(&self, from_id: &str, to_id: &str) -> Result<(), BackendError> {
        let operation = Operation::CreateBobLink;
        let user = self.require_user(operation).await?;
        let url = self.url(
            "rest/v1/bob_links",
            &[("on_conflict", "from_entry_id,to_entry_id")],
        );
        let body = json!({
            "from_entry_id": from_id,
            "to_entry_id": to_id,
            "created_by": user.id,
        });
        let builder = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=ignore-duplicates")
            .json(&body);
        self.send(operation, builder).await?;
        Ok(())
    }

    async fn delete_bob_link(&self, from_id: &str, to_id: &str) -> Result<(), BackendError> {
        let from = format!("eq.{from_id}");
        let to = format!("eq.{to_id}");
        let url = self.url(
            "rest/v1/bob_links",
            &[("from_entry_id", from.as_str()), ("to_entry_id", to.as_str())],
        );
        self.send(Operation::DeleteBobLink, self.request(Method::DELETE, url))
            .await?;
        Ok(())
    }
}

impl AuthBackend for HostedClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.session_call(
            Operation::SignIn,
            "auth/v1/token",
            &[("grant_type", "password")],
            json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn send_otp(&self, email: &str) -> Result<(), BackendError> {
        let url = self.url("auth/v1/otp", &[]);
        let body = json!({ "email": email, "create_user": true });
        self.send(Operation::SendOtp, self.request(Method::POST, url).json(&body))
            .await?;
        Ok(())
    }

    async fn verify_otp(&self, email: &str, code: &str) -> Result<Session, BackendError> {
        self.session_call(
            Operation::VerifyOtp,
            "auth/v1/verify",
            &[],
            json!({ "email": email, "token": code, "type": "email" }),
        )
        .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let operation = Operation::SignUp;
        let query: Vec<(&str, &str)> = self
            .redirect_url
            .as_deref()
            .map(|redirect| ("redirect_to", redirect))
            .into_iter()
            .collect();
        let url = self.url("auth/v1/signup", &query);
        let body = json!({ "email": email, "password": password });
        let response = self
            .send(operation, self.request(Method::POST, url).json(&body))
            .await?;
        let payload: Value = Self::decode(operation, response).await?;
        if payload.get("access_token").is_none() {
            return Ok(SignUpOutcome::ConfirmationRequired);
        }
        let session: Session = serde_json::from_value(payload).map_err(|err| BackendError::Decode {
            operation,
            detail: err.to_string(),
        })?;
        self.set_session(Some(session.clone()));
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.session().is_none() {
            return Ok(());
        }
        let url = self.url("auth/v1/logout", &[]);
        let result = self.send(Operation::SignOut, self.request(Method::POST, url)).await;
        self.set_session(None);
        result.map(|_| ())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        if self.session().is_none() {
            return Ok(None);
        }
        let operation = Operation::ResolveUser;
        let url = self.url("auth/v1/user", &[]);
        let response = self.send(operation, self.request(Method::GET, url)).await?;
        Self::decode(operation, response).await.map(Some)
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), BackendError> {
        let url = self.url("rest/v1/users", &[("on_conflict", "id")]);
        let builder = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates")
            .json(profile);
        self.send(Operation::UpsertProfile, builder).await?;
        Ok(())
    }
}

/// Pulls the human-readable message out of a PostgREST or auth error body.
fn extract_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body.trim()).ok()?;
    payload
        .pointer("/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/msg").and_then(Value::as_str))
        .or_else(|| payload.pointer("/error_description").and_then(Value::as_str))
        .or_else(|| payload.pointer("/error").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryType;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HostedClient {
        HostedClient::new(&BackendConfig {
            url: server.uri(),
            anon_key: "anon".into(),
            redirect_url: Some("http://localhost:3000/dashboard".into()),
        })
        .expect("valid url")
    }

    fn user_json() -> Value {
        json!({ "id": "u1", "email": "ops@example.org", "user_metadata": { "role": "Crisis Manager" } })
    }

    fn session_json() -> Value {
        json!({ "access_token": "tok", "refresh_token": "ref", "user": user_json() })
    }

    #[test]
    fn error_messages_follow_the_usual_fields() {
        assert_eq!(extract_error_message(r#"{"message":"boom"}"#).as_deref(), Some("boom"));
        assert_eq!(
            extract_error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
                .as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(extract_error_message("<html>"), None);
    }

    #[tokio::test]
    async fn rpc_calls_carry_anon_key_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_bob_entries"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer anon"))
            .and(body_json(json!({ "p_crisis_id": null })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "a1",
                "type": "assessment",
                "content": "Fire reported",
                "created_at": "2024-03-01T10:00:00Z",
                "updated_at": "2024-03-01T10:00:00Z",
                "linked_to": []
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let entries = client(&server).bob_entries(None).await.expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, EntryType::Assessment);
    }

    #[tokio::test]
    async fn current_crisis_takes_first_row_or_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_current_crisis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "c1",
                "name": "Warehouse fire",
                "status": "Active",
                "start_time": "2024-03-01T08:00:00Z",
                "duration": "02:15:00"
            }])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_current_crisis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client(&server);
        let crisis = client.current_crisis().await.expect("crisis").expect("some");
        assert_eq!(crisis.name, "Warehouse fire");
        assert_eq!(client.current_crisis().await.expect("crisis"), None);
    }

    #[tokio::test]
    async fn activity_log_sends_paging_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_activity_log"))
            .and(body_json(json!({ "p_limit": 20, "p_offset": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client(&server)
            .activity_log(&ActivityQuery::with_limit(20))
            .await
            .expect("log");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn failures_name_the_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_bob_entries"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "relation missing" })))
            .mount(&server)
            .await;

        let err = client(&server).bob_entries(None).await.expect_err("fails");
        assert_eq!(err.to_string(), "Failed to fetch BOB entries: relation missing");
        assert!(!err.is_auth());
    }

    #[tokio::test]
    async fn linking_requires_a_session() {
        let server = MockServer::start().await;
        let err = client(&server)
            .create_bob_link("j1", "a1")
            .await
            .expect_err("no session");
        assert_eq!(err.to_string(), "Not authenticated: cannot create BOB link");
    }

    #[tokio::test]
    async fn sign_in_stores_session_and_links_as_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/bob_links"))
            .and(query_param("on_conflict", "from_entry_id,to_entry_id"))
            .and(header("prefer", "resolution=ignore-duplicates"))
            .and(body_json(json!({ "from_entry_id": "j1", "to_entry_id": "a1", "created_by": "u1" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let session = client
            .sign_in_with_password("ops@example.org", "secret")
            .await
            .expect("session");
        assert_eq!(session.user.id, "u1");
        client.create_bob_link("j1", "a1").await.expect("link");
    }

    #[tokio::test]
    async fn entry_updates_filter_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/bob_entries"))
            .and(query_param("id", "eq.e1"))
            .and(body_json(json!({ "content": "Revised" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/bob_links"))
            .and(query_param("from_entry_id", "eq.j1"))
            .and(query_param("to_entry_id", "eq.a1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client.update_bob_entry("e1", "Revised").await.expect("update");
        client.delete_bob_link("j1", "a1").await.expect("unlink");
    }

    #[tokio::test]
    async fn otp_flow_requests_then_verifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/otp"))
            .and(body_json(json!({ "email": "ops@example.org", "create_user": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/verify"))
            .and(body_json(json!({ "email": "ops@example.org", "token": "123456", "type": "email" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client.send_otp("ops@example.org").await.expect("otp");
        client.verify_otp("ops@example.org", "123456").await.expect("verify");
        assert_eq!(client.session().map(|s| s.access_token).as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn sign_up_without_session_needs_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(query_param("redirect_to", "http://localhost:3000/dashboard"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .sign_up("ops@example.org", "secret")
            .await
            .expect("sign up");
        assert_eq!(outcome, SignUpOutcome::ConfirmationRequired);
    }

    #[tokio::test]
    async fn sign_out_clears_session_even_when_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "expired" })))
            .mount(&server)
            .await;

        let client = client(&server);
        client.set_session(serde_json::from_value(session_json()).ok());
        let err = client.sign_out().await.expect_err("rejected");
        assert!(err.is_auth());
        assert!(client.session().is_none());
    }
}
