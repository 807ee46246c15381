// folio: headless editing session against a relay.

use clap::Parser;
use folio_engine::config::EngineConfig;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "folio", about = "Document sync and versioning engine")]
struct Cli {
    #[command(subcommand)]
    command: cli::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    cli::run(cli.command, config).await
}
