use crisis_core::{AuthBackend, BackendConfig, HostedClient, Session};

const SESSION_KEY: &str = "crisis-suite.session";

/// Backend location is baked in at build time.
fn backend_config() -> Result<BackendConfig, String> {
    let url = option_env!("SUPABASE_URL").unwrap_or_default();
    let anon_key = option_env!("SUPABASE_ANON_KEY").unwrap_or_default();
    if url.is_empty() || anon_key.is_empty() {
        return Err("Missing Supabase environment variables".into());
    }
    let redirect_url = web_sys::window().and_then(|w| w.location().origin().ok());
    Ok(BackendConfig {
        url: url.to_string(),
        anon_key: anon_key.to_string(),
        redirect_url,
    })
}

pub fn connect() -> Result<HostedClient, String> {
    let config = backend_config()?;
    let client = HostedClient::new(&config).map_err(|e| format!("invalid backend url: {e}"))?;
    client.set_session(load_session());
    Ok(client)
}

fn storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok().flatten()
}

fn load_session() -> Option<Session> {
    let raw = storage()?.get_item(SESSION_KEY).ok().flatten()?;
    serde_json::from_str(&raw).ok()
}

/// Mirrors the client's session into local storage so a reload stays
/// signed in.
pub fn persist_session(client: &HostedClient) {
    let Some(storage) = storage() else {
        return;
    };
    let _ = match client.session() {
        Some(session) => match serde_json::to_string(&session) {
            Ok(raw) => storage.set_item(SESSION_KEY, &raw),
            Err(_) => storage.remove_item(SESSION_KEY),
        },
        None => storage.remove_item(SESSION_KEY),
    };
}

/// Checks a restored session against the backend; stale ones are dropped.
pub async fn restore_session(client: &HostedClient) -> Option<Session> {
    client.session()?;
    match client.current_user().await {
        Ok(Some(_)) => client.session(),
        _ => {
            client.set_session(None);
            persist_session(client);
            None
        }
    }
}

pub async fn sign_out(client: &HostedClient) {
    if let Err(err) = client.sign_out().await {
        leptos::logging::warn!("{err}");
    }
    client.set_session(None);
    persist_session(client);
}
