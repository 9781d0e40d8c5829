use crisis_core::backend::{self, AuthBackend, CrisisBackend};
use crisis_core::views::{format_interval, group_documents};
use crisis_core::{
    ActivityQuery, BackendConfig, BackendError, EntryType, HostedClient, NewActivity, SignUpOutcome,
};
use crisis_server::{router, seed, AppState, Store};

const ANON_KEY: &str = "test-anon-key";

struct TestServer {
    _dir: tempfile::TempDir,
    store: Store,
    url: String,
}

async fn start_server() -> TestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("crisis.db")).expect("open store");
    seed::seed_demo_data(&store, chrono::Utc::now()).expect("seed");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = router(AppState::new(store.clone(), ANON_KEY));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestServer {
        _dir: dir,
        store,
        url: format!("http://{addr}"),
    }
}

fn client(server: &TestServer, anon_key: &str) -> HostedClient {
    HostedClient::new(&BackendConfig {
        url: server.url.clone(),
        anon_key: anon_key.into(),
        redirect_url: None,
    })
    .expect("client")
}

#[tokio::test]
async fn dashboard_and_reference_views_load_anonymously() {
    let server = start_server().await;
    let client = client(&server, ANON_KEY);

    let crisis = client.current_crisis().await.expect("crisis").expect("active crisis");
    assert_eq!(crisis.name, "Warehouse fire, north site");
    assert_eq!(format_interval(&crisis.duration), "2h 15m");

    let query = ActivityQuery {
        crisis_id: Some(crisis.id.clone()),
        ..ActivityQuery::with_limit(2)
    };
    let log = client.activity_log(&query).await.expect("log");
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].description, "Staff headcount completed");

    let cards = client.responsibility_cards().await.expect("cards");
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|c| !c.duties.is_empty()));

    let documents = client.documents().await.expect("documents");
    let labels: Vec<String> = group_documents(&documents).into_iter().map(|g| g.label).collect();
    assert_eq!(labels, ["Crisis Plan", "Procedure", "Reference"]);
}

#[tokio::test]
async fn wrong_api_key_is_rejected() {
    let server = start_server().await;
    let err = client(&server, "nope").documents().await.expect_err("rejected");
    assert_eq!(err.to_string(), "Failed to fetch documents: Invalid API key");
    assert!(err.is_auth());
}

#[tokio::test]
async fn signed_in_user_builds_a_linked_board() {
    let server = start_server().await;
    let client = client(&server, ANON_KEY);

    let outcome = backend::register(&client, "lead@example.org", "correct horse")
        .await
        .expect("sign up");
    let SignUpOutcome::SignedIn(session) = outcome else {
        panic!("local server confirms accounts immediately");
    };
    let profile = server.store.profile(&session.user.id).expect("profile");
    assert_eq!(profile.map(|p| p.email).as_deref(), Some("lead@example.org"));

    let board = backend::add_entry(&client, None, EntryType::Assessment, "Roof partially collapsed")
        .await
        .expect("assessment");
    let assessment = board
        .entries()
        .iter()
        .find(|e| e.content == "Roof partially collapsed")
        .expect("stored")
        .id
        .clone();
    let board = backend::add_entry(&client, None, EntryType::Judgment, "Hall B cannot be re-entered")
        .await
        .expect("judgment");
    let judgment = board
        .entries()
        .iter()
        .find(|e| e.content == "Hall B cannot be re-entered")
        .expect("stored")
        .id
        .clone();

    let targets = vec![assessment.clone(), assessment.clone()];
    let board = backend::link_entries(&client, &board, None, &judgment, &targets)
        .await
        .expect("link");
    let linked: Vec<&str> = board.linked_entries(&judgment).iter().map(|e| e.id.as_str()).collect();
    assert_eq!(linked, [assessment.as_str()]);
    assert!(board.has_incoming_links(&assessment));

    // The server enforces the layering rule on its own.
    let err = client
        .create_bob_link(&assessment, &judgment)
        .await
        .expect_err("upward link");
    assert_eq!(
        err.to_string(),
        "Failed to create BOB link: assessment entries cannot link to judgment entries"
    );

    client
        .create_activity(&NewActivity {
            crisis_id: None,
            description: "Board reviewed".into(),
            timestamp: None,
        })
        .await
        .expect("activity");

    client.sign_out().await.expect("sign out");
    let err = client
        .create_bob_link(&judgment, &assessment)
        .await
        .expect_err("signed out");
    assert!(matches!(err, BackendError::NotAuthenticated { .. }));
}

#[tokio::test]
async fn one_time_code_sign_in() {
    let server = start_server().await;
    let client = client(&server, ANON_KEY);

    let email = backend::request_code(&client, " responder@example.org ")
        .await
        .expect("send code");
    let code = server
        .store
        .pending_otp(&email)
        .expect("lookup")
        .expect("code issued");

    let err = backend::sign_in_with_code(&client, &email, "not-it")
        .await
        .expect_err("wrong code");
    assert_eq!(err.to_string(), "Failed to verify one-time code: Token has expired or is invalid");

    let session = backend::sign_in_with_code(&client, &email, &code)
        .await
        .expect("verify");
    let user = client.current_user().await.expect("user").expect("signed in");
    assert_eq!(user.id, session.user.id);
}

#[tokio::test]
async fn bad_password_surfaces_backend_message() {
    let server = start_server().await;
    let client = client(&server, ANON_KEY);
    server
        .store
        .sign_up("ops@example.org", "secret")
        .expect("account");

    let err = backend::sign_in(&client, "ops@example.org", "wrong")
        .await
        .expect_err("bad password");
    assert_eq!(err.to_string(), "Failed to sign in: Invalid login credentials");
    assert!(client.session().is_none());
}

#[tokio::test]
async fn blank_activity_is_a_client_error() {
    let server = start_server().await;
    let client = client(&server, ANON_KEY);
    backend::register(&client, "scribe@example.org", "pw")
        .await
        .expect("sign up");

    let err = client
        .create_activity(&NewActivity {
            crisis_id: None,
            description: "   ".into(),
            timestamp: None,
        })
        .await
        .expect_err("blank description");
    assert_eq!(
        err.to_string(),
        "Failed to create activity: Activity description is required."
    );
    assert!(matches!(err, BackendError::Remote { status: 400, .. }));
}

#[tokio::test]
async fn writes_on_behalf_of_someone_else_are_forbidden() {
    let server = start_server().await;
    let client = client(&server, ANON_KEY);
    let SignUpOutcome::SignedIn(session) = backend::register(&client, "lead@example.org", "pw")
        .await
        .expect("sign up")
    else {
        panic!("local server confirms accounts immediately");
    };
    let entries = client.bob_entries(None).await.expect("entries");
    let from = entries
        .iter()
        .find(|e| e.entry_type == EntryType::Judgment)
        .expect("seeded judgment");
    let to = entries
        .iter()
        .find(|e| e.entry_type == EntryType::Assessment)
        .expect("seeded assessment");

    let http = reqwest::Client::new();
    let link = http
        .post(format!("{}/rest/v1/bob_links", server.url))
        .header("apikey", ANON_KEY)
        .bearer_auth(&session.access_token)
        .json(&serde_json::json!({
            "from_entry_id": from.id,
            "to_entry_id": to.id,
            "created_by": "someone-else",
        }))
        .send()
        .await
        .expect("send");
    assert_eq!(link.status().as_u16(), 403);

    let profile = http
        .post(format!("{}/rest/v1/users", server.url))
        .header("apikey", ANON_KEY)
        .bearer_auth(&session.access_token)
        .json(&serde_json::json!({ "id": "someone-else", "email": "x@example.org" }))
        .send()
        .await
        .expect("send");
    assert_eq!(profile.status().as_u16(), 403);
    assert!(server.store.profile("someone-else").expect("lookup").is_none());
}
