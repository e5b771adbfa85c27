//! TaskCore - scheduled task lifecycle engine
//!
//! CLI entry point for parsing products and running the scheduler against
//! a dry-run automation worker.

use std::fs;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use taskcore::cli::{Cli, Command, log_path};
use taskcore::config::Config;
use taskcore::domain::{ProductDescriptor, Store, TaskSpec};
use taskcore::lifecycle::LoggingPort;
use taskcore::state::{Settings, StateContainer, StateEvent, StateManager, spawn_scheduler};

fn setup_logging(level: &str) -> Result<()> {
    let log_file = log_path();
    if let Some(log_dir) = log_file.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Write to the log file, not stdout/stderr
    let level: tracing::Level = level
        .parse()
        .map_err(|_| eyre::eyre!("Invalid log level: {}", level))?;
    let file = fs::File::create(&log_file).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // CLI flag wins over config
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    match cli.command {
        Command::Parse { raw } => cmd_parse(&raw),
        Command::Config => cmd_config(&config),
        Command::Run {
            product,
            store_url,
            at,
            amount,
        } => cmd_run(&config, product, store_url, at, amount).await,
    }
}

/// Print the classified product, exiting non-zero if it is rejected
fn cmd_parse(raw: &str) -> Result<()> {
    match ProductDescriptor::parse(raw) {
        Ok(descriptor) => {
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            std::process::exit(1);
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}

async fn cmd_run(
    config: &Config,
    product: String,
    store_url: String,
    at: Option<chrono::DateTime<Utc>>,
    amount: u32,
) -> Result<()> {
    let state = StateContainer::new(
        Arc::new(LoggingPort),
        Settings::from(&config.automation),
        &config.scheduler,
    );
    let manager = StateManager::spawn(state, config.events.capacity);
    let mut events = manager.subscribe_events();

    let store = Store::new(store_url.clone(), store_url);
    let mut spec = TaskSpec::new(store, product);
    // Without a schedule, start now so the first tick picks them up
    spec.schedule = Some(at.unwrap_or_else(Utc::now));

    let tasks = manager.create_tasks(spec, amount).await.context("Failed to create tasks")?;
    for task in &tasks {
        println!("{} {} ({:?})", "created".green(), task.id, task.platform);
    }

    let scheduler = spawn_scheduler(manager.clone(), &config.scheduler);
    println!("Scheduler running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(StateEvent::TasksChanged) => {
                    for task in manager.list_tasks().await? {
                        println!("{} {} {}", task.id, task.state.to_string().cyan(), task.message);
                    }
                }
                Ok(other) => println!("{:?}", other),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    println!("{} missed {} events", "warning:".yellow(), n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let stopped = manager.stop_all().await?;
    info!(count = stopped.len(), "Stopped tasks on exit");
    manager.shutdown().await?;
    scheduler.await.context("Scheduler task failed")?;
    Ok(())
}
