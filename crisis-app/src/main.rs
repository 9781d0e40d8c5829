use clap::Parser;
use crisis_app::config::AppConfig;
use crisis_app::Cli;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let output = if cli.demo {
        crisis_app::run_demo(&cli).await?
    } else {
        let config = AppConfig::load()?;
        crisis_app::run(&cli, &config).await?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
