//! vibe-relay - relay chat instructions to a local agent CLI.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod prompt;

use config::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` may supply any VIBE_* setting, so load it before parsing.
    dotenvy::dotenv().ok();

    // Worker output owns stdout; logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => commands::run(&cli).await,
        Command::Send { message } => commands::send(&cli, &message).await,
        Command::Dialogs => commands::dialogs(&cli).await,
        Command::Proxy {
            bind,
            upstream,
            memory: _,
        } => commands::proxy(bind, upstream.as_deref()).await,
    }
}
