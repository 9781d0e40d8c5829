pub mod commands;
pub mod config;
pub mod state;

use clap::{Parser, Subcommand};
use crisis_core::backend::{self, CrisisBackend};
use crisis_core::{BackendError, EntryType, HostedClient, MemoryBackend};
use serde_json::Value;

use crate::config::{AppConfig, ConfigError};
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "crisis-app", version, about = "Crisis team dashboard, BOB board and reference material")]
pub struct Cli {
    /// Run against seeded in-memory data instead of the configured backend.
    #[arg(long)]
    pub demo: bool,

    /// Only show BOB entries of this crisis.
    #[arg(long, global = true)]
    pub crisis: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Current crisis and the latest activities.
    Dashboard,
    /// BOB board in three columns.
    Bob,
    /// Add an entry to the BOB board.
    Add {
        /// assessment, judgment or decision
        entry_type: EntryType,
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },
    /// Link an entry to entries of earlier layers.
    Link {
        from: String,
        #[arg(required = true, num_args = 1..)]
        to: Vec<String>,
    },
    /// Responsibility cards, with your role highlighted.
    Cards,
    /// Document library grouped by type.
    Documents,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}

pub async fn execute<B: CrisisBackend>(state: &AppState<B>, command: &Command) -> Result<Value, AppError> {
    let value = match command {
        Command::Dashboard => serde_json::to_value(commands::dashboard(state, chrono::Utc::now()).await)?,
        Command::Bob => serde_json::to_value(commands::board(state).await?)?,
        Command::Add { entry_type, content } => {
            serde_json::to_value(commands::add_entry(state, *entry_type, &content.join(" ")).await?)?
        }
        Command::Link { from, to } => serde_json::to_value(commands::link_entries(state, from, to).await?)?,
        Command::Cards => serde_json::to_value(commands::responsibility_cards(state).await?)?,
        Command::Documents => serde_json::to_value(commands::documents(state).await?)?,
    };
    Ok(value)
}

pub async fn run_demo(cli: &Cli) -> Result<Value, AppError> {
    let state = AppState::new(MemoryBackend::demo())
        .signed_in_as(None)
        .with_crisis(cli.crisis.clone());
    execute(&state, &cli.command).await
}

/// Runs one command against the hosted backend. Signs in first when the
/// config carries credentials; the signed-in user's role drives the
/// responsibility card highlight.
pub async fn run(cli: &Cli, config: &AppConfig) -> Result<Value, AppError> {
    let client = HostedClient::new(config.backend()?).map_err(|err| AppError::InvalidUrl(err.to_string()))?;

    let mut state = AppState::new(client.clone());
    if let Some(auth) = &config.auth {
        let session = backend::sign_in(&client, &auth.email, &auth.password).await?;
        tracing::info!(user = %session.user.id, "signed in");
        state = state.signed_in_as(session.user.metadata_str("role"));
    }

    let state = state.with_crisis(cli.crisis.clone());
    execute(&state, &cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_with_free_text() {
        let cli = Cli::try_parse_from(["crisis-app", "--demo", "add", "judgment", "Hall", "B", "unsafe"])
            .expect("parse");
        assert!(cli.demo);
        match cli.command {
            Command::Add { entry_type, content } => {
                assert_eq!(entry_type, EntryType::Judgment);
                assert_eq!(content.join(" "), "Hall B unsafe");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_entry_type_and_empty_link() {
        assert!(Cli::try_parse_from(["crisis-app", "add", "hunch", "text"]).is_err());
        assert!(Cli::try_parse_from(["crisis-app", "link", "entry-1"]).is_err());
    }

    #[tokio::test]
    async fn demo_board_has_three_columns() {
        let cli = Cli::try_parse_from(["crisis-app", "--demo", "bob"]).expect("parse");
        let value = run_demo(&cli).await.expect("run");
        let titles: Vec<&str> = value
            .as_array()
            .expect("columns")
            .iter()
            .filter_map(|c| c["title"].as_str())
            .collect();
        assert_eq!(titles, ["Situation Assessment", "Judgment", "Decision"]);
    }

    #[tokio::test]
    async fn demo_dashboard_serializes_load_states() {
        let cli = Cli::try_parse_from(["crisis-app", "--demo", "dashboard"]).expect("parse");
        let value = run_demo(&cli).await.expect("run");
        assert_eq!(value["crisis"]["state"], "ready");
        assert_eq!(value["crisis"]["data"]["status"], "Active");
        assert_eq!(value["activities"]["data"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn missing_backend_is_a_config_error() {
        let cli = Cli::try_parse_from(["crisis-app", "cards"]).expect("parse");
        let err = run(&cli, &AppConfig::default()).await.expect_err("no backend");
        assert!(matches!(err, AppError::Config(ConfigError::MissingBackend)));
    }
}
