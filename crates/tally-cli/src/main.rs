//! # tally-cli
//!
//! Demo driver: seeds an in-memory backend, logs in, fires a burst of
//! intents, waits for the queue to drain and prints the final state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{info, warn};

use tally_core::domain::{ActionStatus, RawActionRecord, RecordId};
use tally_core::impls::{FailureMode, InMemoryBackend};
use tally_core::ports::SystemClock;
use tally_core::{Action, SyncConfig, SyncEngine, TemplateId};

const DEMO_PASSWORD: &str = "demo";

/// Optimistic sync demo against an in-memory backend.
#[derive(Parser, Debug)]
#[command(name = "tally", about = "Optimistic task sync demo")]
struct Cli {
    /// JSON config file (TALLY_* env vars override it).
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "demo@example.com")]
    email: String,

    /// Number of increments to enqueue, spread across the demo tasks.
    #[arg(long, default_value = "4")]
    intents: usize,

    /// Fail this many transition calls before the backend recovers.
    #[arg(long, default_value = "0")]
    flaky: u32,

    /// Print the final state as JSON.
    #[arg(long)]
    json: bool,
}

fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Three weekly tasks with a few units each, one already done.
fn demo_records() -> Vec<RawActionRecord> {
    let now = Utc::now();
    let tasks = [
        ("call-customers", "Call customers", "Sales", 3),
        ("review-invoices", "Review invoices", "Finance", 2),
        ("water-plants", "Water plants", "Office", 2),
    ];

    let mut records = Vec::new();
    for (template, title, team, units) in tasks {
        for n in 0..units {
            let created = now - Duration::minutes(10 * (units - n));
            records.push(
                RawActionRecord::new(
                    RecordId::new(format!("{template}-{n}")),
                    TemplateId::new(template),
                    title,
                    ActionStatus::Pending,
                    created,
                )
                .with_team(team),
            );
        }
    }
    if let Some(last) = records.last_mut() {
        last.status = ActionStatus::Done;
        last.finished_at = Some(now);
    }
    records
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref()).context("failed to load config")?;
    init_subscriber(&config.log_level);

    let clock = Arc::new(SystemClock);
    let backend = Arc::new(
        InMemoryBackend::new(clock.clone())
            .with_account(&cli.email, DEMO_PASSWORD, Some("Demo User"))
            .with_records(demo_records()),
    );
    if cli.flaky > 0 {
        backend.set_transition_failures(FailureMode::Next(cli.flaky));
    }

    let engine = SyncEngine::builder(backend.clone())
        .config(config)
        .clock(clock)
        .build()
        .context("invalid sync config")?;

    let subscription = engine.subscribe(|state| {
        if !state.pending_changes.is_empty() {
            info!(pending = state.pending_changes.len(), "pending changes");
        }
    });

    let user = engine.login(&cli.email, DEMO_PASSWORD).await?;
    info!(email = %user.email, tasks = engine.snapshot().tasks.len(), "session ready");

    let ids: Vec<TemplateId> = engine.snapshot().tasks.iter().map(|t| t.id.clone()).collect();
    for id in ids.iter().cycle().take(cli.intents) {
        if engine.enqueue_action(id, Action::Increment).is_none() {
            warn!(task_id = %id, "intent skipped");
        }
    }

    tokio::select! {
        _ = engine.wait_until_idle() => {}
        _ = tokio::signal::ctrl_c() => warn!("interrupted; dropping queued intents"),
    }

    let state = engine.snapshot();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        for task in &state.tasks {
            println!(
                "{:<20} {}/{}{}",
                task.name,
                task.execution_count,
                task.target_count,
                if task.is_completed { "  done" } else { "" }
            );
        }
        if let Some(error) = &state.error {
            println!("error: {error}");
        }
    }

    subscription.unsubscribe();
    engine.logout();
    Ok(())
}
