mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, MemoryCommands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_agent=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            cli::run_review(&args).await?;
        }
        Commands::Files { path } => {
            cli::list_files(&path)?;
        }
        Commands::Memory { db, command } => match command {
            MemoryCommands::Dump { kind, limit, json } => {
                cli::memory_dump(&db, kind.as_deref(), limit, json)?;
            }
            MemoryCommands::Query { text, kind, top_k } => {
                cli::memory_query(&db, &text, kind.as_deref(), top_k)?;
            }
        },
    }

    Ok(())
}
