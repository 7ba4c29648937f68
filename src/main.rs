//! Ops entrypoint for the migration engine.
//!
//! This binary is a debugging/smoke-test tool, not the real integration
//! point — a hosting scheduler calls [`statestore_migrate::orchestrator`]
//! in-process, against its own store and collaborator adapters, before it
//! starts serving. This CLI runs the same flow against the crate's
//! in-memory reference store so the engine's behavior can be inspected
//! without wiring up a real backend.

use anyhow::Result;
use clap::{Parser, Subcommand};
use statestore_migrate::collaborators::test_doubles::{InMemoryAppRepository, InMemoryGroupRepository};
use statestore_migrate::config::EngineConfig;
use statestore_migrate::kvs::memory::InMemoryKvs;
use statestore_migrate::orchestrator::MigrationEngine;
use statestore_migrate::registry;
use statestore_migrate::version::Version;
use std::env;
use std::sync::Arc;

include!(concat!(env!("OUT_DIR"), "/app_metadata.rs"));

#[derive(Debug, Parser)]
#[command(name = "statestore-migrate", about = "Schema migration engine ops entrypoint")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Prefix under which live state lives in the reference store.
    #[arg(long, global = true, default_value = "/marathon/state")]
    state_prefix: String,

    /// Prefix under which backup snapshots are written.
    #[arg(long, global = true, default_value = "/marathon/backup")]
    backup_prefix: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the version the engine would report as currently stored
    Status,
    /// Show which steps would run starting from a given stored version
    History {
        /// Stored version to filter from, e.g. "0.8.0"
        #[arg(long, default_value = "0.0.0")]
        from: String,
    },
    /// Run a full migration against the in-memory reference store
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing only if debug mode is enabled, so normal CLI
    // usage isn't cluttered with log output.
    if env::var("MIGRATE_DEBUG").is_ok() || env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "statestore_migrate=debug".into()))
            .init();
    }

    let cli = Cli::parse();
    let current = Version::current_from_build(APP_METADATA_VERSION)?;

    match cli.command {
        Command::Status => {
            let engine = build_engine(&cli.state_prefix, &cli.backup_prefix, current)?;
            let stored = engine.current_storage_version().await?;
            println!("stored version: {stored}");
            println!("binary version: {current}");
        }
        Command::History { from } => {
            let from = Version::current_from_build(&from)?;
            let reg = registry::build_registry();
            let applicable = registry::applicable_steps(&reg, from);
            if applicable.is_empty() {
                println!("no steps would run from {from}");
            } else {
                println!("steps that would run from {from}:");
                for step in applicable {
                    println!("  -> {}", step.target_version());
                }
            }
        }
        Command::Run => {
            let engine = build_engine(&cli.state_prefix, &cli.backup_prefix, current)?;
            match engine.migrate().await {
                Ok(committed) => println!("migrated to {committed}"),
                Err(err) => {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn build_engine(state_prefix: &str, backup_prefix: &str, current: Version) -> Result<MigrationEngine> {
    let kvs = Arc::new(InMemoryKvs::new());
    let apps = Arc::new(InMemoryAppRepository::new());
    let groups = Arc::new(InMemoryGroupRepository::new());
    let config = EngineConfig::new(state_prefix, backup_prefix)?;
    Ok(MigrationEngine::with_managed_store(kvs, apps, groups, config, current))
}
