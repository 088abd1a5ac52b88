//! perfdash command line entry point

use clap::Parser;
use perfdash::PropagationEngine;
use perfdash::cli::{self, Cli, Command};
use perfdash::config::{Config, StoreBackend};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; the filter is swapped once the config is known
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, filter_handle) =
        reload::Layer::new(EnvFilter::new(cli.initial_log_filter(rust_log.as_deref())));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load().await?;
    if let Some(level) = cli.configured_log_filter(rust_log.as_deref(), config.logging.level())
        && let Err(e) = filter_handle.reload(EnvFilter::new(level))
    {
        tracing::warn!(error = %e, "Could not apply configured log level");
    }

    if let Some(path) = cli.store {
        config.store.backend = Some(StoreBackend::File);
        config.store.path = Some(path);
    }

    let result = run(&config, cli.command).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

fn open_engine(config: &Config) -> anyhow::Result<PropagationEngine> {
    let engine = config.engine()?;
    tracing::debug!(options = ?engine.options(), "Engine ready");
    Ok(engine)
}

async fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Complete(args) => cli::progress::complete(&open_engine(config)?, args),
        Command::Log(args) => cli::progress::log(&open_engine(config)?, args),
        Command::Recalc => cli::progress::recalc(&open_engine(config)?),
        Command::Status(args) => cli::progress::status(&open_engine(config)?, args),
        Command::Import(args) => cli::progress::import(&open_engine(config)?, args).await,
        Command::MigrateTasks => cli::progress::migrate_tasks(&open_engine(config)?),
        Command::Config(args) => cli::config::execute(args).await,
    }
}
