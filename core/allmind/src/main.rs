//! allmind: operator CLI over the repository and shim dashboard.
//!
//! Every subcommand prints one JSON document on stdout; logs go to stderr
//! (or `ALLMIND_LOG_DIR`).
//!
//! ## Subcommands
//!
//! - `snapshot`: repo snapshot, optionally refreshed first
//! - `repo`: one repo's record plus its memory documents
//! - `shims`: shim reconciliation report
//! - `doctor`: strap health checks
//! - `registry`: the raw registry document
//! - `watch`: run the background refresher until interrupted

mod logging;

use allmind_core::{AllmindError, Dashboard};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "allmind")]
#[command(about = "Repository registry and shim dashboard")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the repo snapshot
    Snapshot {
        /// Rescan before printing (joins a scan already running)
        #[arg(long)]
        refresh: bool,
    },

    /// Print one repo's record and memory documents
    Repo {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Print the shim reconciliation report
    Shims,

    /// Run strap health checks
    Doctor,

    /// Print the raw registry document
    Registry,

    /// Refresh on a fixed cadence, printing a summary per generation
    Watch {
        /// Seconds between scans (defaults to ALLMIND_REFRESH_SECS or 30)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}

fn main() -> ExitCode {
    let _logging_guard = logging::init();
    let cli = Cli::parse();
    let dashboard = Dashboard::from_env();

    let result = match cli.command {
        Commands::Snapshot { refresh } => print_json(&dashboard.get_snapshot(refresh)),
        Commands::Repo { name } => {
            // A one-shot process has no warm cache; scan before looking up.
            dashboard.get_snapshot(true);
            dashboard
                .get_entity_detail(&name)
                .and_then(|detail| print_json(&detail))
        }
        Commands::Shims => print_json(&dashboard.get_shim_report()),
        Commands::Doctor => print_json(&dashboard.run_doctor()),
        Commands::Registry => dashboard
            .get_registry()
            .and_then(|registry| print_json(&registry)),
        Commands::Watch { interval } => {
            watch(&dashboard, interval.map(Duration::from_secs));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "allmind command failed");
            let body = serde_json::json!({ "error": err.to_string() });
            println!("{body}");
            if err.is_not_found() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AllmindError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| AllmindError::Json {
        context: "serializing output".to_string(),
        source,
    })?;
    println!("{text}");
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationLine {
    generation: u64,
    count: usize,
    missing: usize,
    git_errors: usize,
    dirty: usize,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    registry_error: Option<String>,
}

/// Runs until the process is interrupted.
fn watch(dashboard: &Dashboard, interval: Option<Duration>) {
    let interval = interval
        .filter(|d| !d.is_zero())
        .unwrap_or(dashboard.config().refresh_interval);
    let _refresher = dashboard.cache().spawn_refresher(interval);
    let poll = interval.min(Duration::from_secs(1));
    let mut last_seen = 0;

    loop {
        thread::sleep(poll);
        let current = dashboard.get_snapshot(false).snapshot;
        if current.generation == last_seen {
            continue;
        }
        last_seen = current.generation;
        let summary = current.summary();
        let line = GenerationLine {
            generation: current.generation,
            count: summary.total,
            missing: summary.missing,
            git_errors: summary.git_errors,
            dirty: summary.dirty,
            duration_ms: current.duration_ms,
            registry_error: current.registry_error.clone(),
        };
        match serde_json::to_string(&line) {
            Ok(text) => println!("{text}"),
            Err(err) => tracing::warn!(error = %err, "Failed to serialize generation summary"),
        }
    }
}
