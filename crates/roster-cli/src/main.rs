//! `roster` — operator CLI for the enrollment status history.
//!
//! # Usage
//!
//! ```text
//! roster apply --flow erp change.json
//! roster order events.jsonl
//! roster timeline --student s-1 --location l-1
//! roster --config /etc/roster.toml students s-1 s-2
//! ```
//!
//! Outcomes are printed to stdout as JSON; logs go to stderr.

mod settings;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use roster_core::{
  Error,
  interval::{GroupKey, StatusChange},
  order::OrderEvent,
  transition::FlowKind,
};
use roster_engine::Engine;
use roster_store_sqlite::SqliteStore;
use serde::Serialize;
use settings::RosterConfig;
use tokio::io::AsyncReadExt as _;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "roster", version, about = "Enrollment status history engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "roster.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Validate and apply one manual status change read as JSON.
  Apply {
    /// Which rule set the edit is judged by.
    #[arg(long, value_enum, default_value_t = Flow::Lms)]
    flow:  Flow,
    /// JSON file holding the change; stdin when omitted.
    input: Option<PathBuf>,
  },
  /// Apply order events, one JSON object per line.
  Order {
    /// JSON-lines file of events; stdin when omitted.
    input: Option<PathBuf>,
  },
  /// Print the timeline of one student at one location.
  Timeline {
    #[arg(long)]
    student:  String,
    #[arg(long)]
    location: String,
  },
  /// Print the activation and access paths of students.
  Students {
    #[arg(required = true)]
    ids: Vec<String>,
  },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Flow {
  Lms,
  Erp,
}

impl From<Flow> for FlowKind {
  fn from(flow: Flow) -> Self {
    match flow {
      Flow::Lms => FlowKind::Lms,
      Flow::Erp => FlowKind::Erp,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let cfg = RosterConfig::load(&cli.config)?;

  // `RUST_LOG` wins over the configured filter.
  let directives =
    std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| cfg.log_filter.clone());
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives),
    )
    .init();

  let store_path = cfg.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let engine = Engine::new(store, cfg.engine());

  match cli.command {
    Command::Apply { flow, input } => apply(&engine, flow, input.as_deref()).await,
    Command::Order { input } => order(&engine, input.as_deref()).await,
    Command::Timeline { student, location } => {
      let timeline = engine.timeline(&GroupKey::new(student, location)).await?;
      print_json(&timeline)
    }
    Command::Students { ids } => students(engine.store(), &ids).await,
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn apply(engine: &Engine<SqliteStore>, flow: Flow, input: Option<&Path>) -> Result<()> {
  let raw = read_input(input).await?;
  let change: StatusChange =
    serde_json::from_str(&raw).context("failed to parse status change")?;

  let outcome = engine
    .validate_and_apply(change, flow.into())
    .await
    .context("status change was not applied")?;
  print_json(&outcome)
}

async fn order(engine: &Engine<SqliteStore>, input: Option<&Path>) -> Result<()> {
  let raw = read_input(input).await?;
  let mut failed = 0usize;
  let mut total = 0usize;

  for (index, line) in raw.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    total += 1;
    let event: OrderEvent = serde_json::from_str(line)
      .with_context(|| format!("failed to parse order event on line {}", index + 1))?;

    match engine.handle_order_event(&event).await {
      Ok(outcome) => print_json(&outcome)?,
      // Redelivery of an order that was already applied.
      Err(failure) if matches!(failure.error, Error::AlreadyExists { .. }) => {
        info!(order_id = %event.order_id, "order already applied; skipping");
      }
      Err(failure) => {
        warn!(order_id = %event.order_id, retryable = failure.retryable, error = %failure.error, "order event failed");
        failed += 1;
      }
    }
  }

  if failed > 0 {
    bail!("{failed} of {total} order events failed");
  }
  Ok(())
}

#[derive(Serialize)]
struct StudentView {
  student_id:     String,
  active:         bool,
  deactivated_at: Option<String>,
  locations:      Vec<String>,
}

async fn students(store: &SqliteStore, ids: &[String]) -> Result<()> {
  let mut views = Vec::with_capacity(ids.len());
  for id in ids {
    let Some(record) = store.student(id).await? else {
      warn!(student_id = %id, "unknown student");
      continue;
    };
    views.push(StudentView {
      student_id:     record.student_id,
      active:         record.deactivated_at.is_none(),
      deactivated_at: record.deactivated_at.map(|at| at.to_rfc3339()),
      locations:      record.locations,
    });
  }
  print_json(&views)
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn read_input(path: Option<&Path>) -> Result<String> {
  match path {
    Some(path) => tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read {path:?}")),
    None => {
      let mut buf = String::new();
      tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("failed to read stdin")?;
      Ok(buf)
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
