use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

mod adapter;
mod app;
mod chat;
mod config;
mod copy;
mod events;
mod health;
mod ui;

use crate::config::{Config, Language};
use crate::health::{HealthClient, HealthState};

#[derive(Parser)]
#[command(name = "stanley")]
#[command(version)]
#[command(about = "Terminal chat client for Stanley IA", long_about = None)]
struct Cli {
    /// Force the mock assistant even when an upstream is configured
    #[arg(long)]
    mock: bool,

    /// Interface language (pt-BR or en-US)
    #[arg(long)]
    lang: Option<Language>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the upstream health endpoint and exit
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if cli.mock {
        config.force_mock = true;
    }
    if let Some(lang) = cli.lang {
        config.language = lang;
    }

    match cli.command {
        Some(Commands::Health) => print_health(config).await,
        None => app::run(config).await,
    }
}

async fn print_health(config: Config) -> Result<()> {
    let health = HealthClient::new(Arc::new(config))?;
    match health.state().await {
        HealthState::Mock => println!("mock mode: no upstream configured"),
        HealthState::Online { model: Some(model) } => println!("online ({model})"),
        HealthState::Online { model: None } => println!("online"),
        HealthState::Offline => println!("offline"),
        HealthState::Unknown => println!("unknown"),
    }
    Ok(())
}
