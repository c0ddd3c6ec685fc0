//! `rigidtrack` – command line front end for the object tracker.
//!
//! - `rigidtrack check --config tracker.toml` validates a configuration and
//!   prints what it describes.
//! - `rigidtrack replay --config tracker.toml --frames capture.jsonl
//!   [--output poses.jsonl]` replays recorded point clouds and writes one
//!   JSON line of poses and statuses per frame (stdout by default).
//!
//! `--config` falls back to `RIGIDTRACK_CONFIG`.  Ctrl-C stops a replay
//! after the frame in flight.

mod config;
mod replay;
mod telemetry;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use rigidtrack_types::TrackError;

#[derive(Debug, Parser)]
#[command(name = "rigidtrack", version, about = "Rigid-body tracking from unlabeled marker clouds")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a tracker configuration file.
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Replay recorded frames through the tracker.
    Replay {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Newline-delimited JSON frames.
        #[arg(short, long)]
        frames: PathBuf,
        /// Destination for per-frame output; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = telemetry::init_tracing("rigidtrack");

    let result = match cli.command {
        Command::Check { config } => run_check(config),
        Command::Replay { config, frames, output } => run_replay(config, frames, output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "rigidtrack failed");
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

fn load_config(explicit: Option<PathBuf>) -> Result<config::Config, TrackError> {
    let path = config::config_path(explicit).ok_or_else(|| {
        TrackError::Config(format!("no configuration given; pass --config or set {}", config::CONFIG_ENV))
    })?;
    config::load_from(&path)
}

fn run_check(explicit: Option<PathBuf>) -> Result<(), TrackError> {
    let cfg = load_config(explicit)?;
    let parts = cfg.resolve()?;

    println!("{} configuration is valid", "✓".green().bold());
    println!(
        "  {} marker configuration(s), {} dynamics configuration(s)",
        parts.marker_configurations.len(),
        parts.dynamics_configurations.len()
    );
    for (object, spec) in parts.objects.iter().zip(&cfg.objects) {
        println!(
            "  • {} [{} markers, dynamics '{}']",
            object.name().bold(),
            parts.marker_configurations[object.marker_configuration_idx()].len(),
            spec.dynamics_configuration
        );
    }
    if parts.objects.is_empty() {
        println!("  {}", "No objects configured.".yellow());
    }
    Ok(())
}

fn run_replay(
    explicit: Option<PathBuf>,
    frames: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), TrackError> {
    let mut tracker = load_config(explicit)?.build_tracker()?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("{}", "⚠  Ctrl-C received – stopping after the current frame …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; replay can only run to completion");
    }

    let input = File::open(&frames)
        .map_err(|e| TrackError::Io(format!("failed to open {}: {}", frames.display(), e)))?;
    let sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|e| {
            TrackError::Io(format!("failed to create {}: {}", path.display(), e))
        })?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let summary = replay::replay(&mut tracker, BufReader::new(input), sink, &shutdown)?;
    print_summary(&summary);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Summary
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(summary: &replay::ReplaySummary) {
    eprintln!();
    let interrupted = if summary.interrupted { " (interrupted)".yellow().to_string() } else { String::new() };
    eprintln!("  {} frame(s) replayed{}", summary.frames.to_string().bold(), interrupted);
    match summary.initialized_at {
        Some(i) => eprintln!("  Initialized on frame {}", i.to_string().green()),
        None => eprintln!("  {}", "Never initialized.".red()),
    }
    for tally in &summary.objects {
        eprintln!(
            "    • {:<16} {} accepted, {} rejected",
            tally.name.bold(),
            tally.accepted.to_string().green(),
            if tally.rejected == 0 {
                tally.rejected.to_string().normal()
            } else {
                tally.rejected.to_string().yellow()
            }
        );
    }
}
