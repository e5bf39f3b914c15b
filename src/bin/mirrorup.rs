//! # mirrorup CLI - incremental backups from a config file
//!
//! ## Usage
//! ```bash
//! # Back up everything listed in backup.toml
//! mirrorup -c backup.toml
//!
//! # Show what would be copied, with per-decision logging
//! mirrorup -c backup.toml --dry-run --log-level debug
//!
//! # Machine-readable report
//! mirrorup -c backup.toml --json
//! ```
//!
//! Exit status is 0 on success, 1 if any target failed, 2 on configuration
//! errors.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use mirrorup::logging::init_tracing;
use mirrorup::{BackupConfig, BackupPlanner, MirrorError, RunReport, TargetOutcome, TargetReport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// mirrorup - copy only what changed into a backup tree
#[derive(Parser)]
#[command(name = "mirrorup")]
#[command(version)]
#[command(about = "Incrementally mirror files and directories into a backup destination")]
#[command(long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    /// Override backup_dest from the config file
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Report what would be copied without copying
    #[arg(long)]
    dry_run: bool,

    /// Stop at the first failing target
    #[arg(long)]
    fail_fast: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Show a spinner while targets are processed
    #[arg(long)]
    progress: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Info,
    Debug,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose || cli.log_level == LogLevel::Debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    init_tracing(level);

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(report) if report.has_failures() => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e
                .downcast_ref::<MirrorError>()
                .map(MirrorError::is_fatal)
                .unwrap_or(false);
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::from(if fatal { 2 } else { 1 })
        }
    }
}

/// Load the config, run the backup and print the report
fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let mut config = BackupConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dest) = &cli.dest {
        config = config.with_backup_dest(dest)?;
    }
    if cli.fail_fast {
        config.on_error = mirrorup::ErrorPolicy::Abort;
    }

    let spinner = if cli.progress && !cli.json {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .context("invalid progress template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Backing up...");
        Some(pb)
    } else {
        None
    };
    let on_target = |report: &TargetReport| {
        if let Some(pb) = &spinner {
            pb.set_message(format!("{}", report.target.display()));
        }
    };

    let report = if cli.dry_run {
        BackupPlanner::dry_run_from_config(&config)?.run_with_progress(
            &config.backup_dest,
            &config.targets,
            Some(on_target),
        )?
    } else {
        BackupPlanner::from_config(&config)?.run_with_progress(
            &config.backup_dest,
            &config.targets,
            Some(on_target),
        )?
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

/// Print one line per target and a summary
fn print_report(report: &RunReport) {
    let heading = if report.dry_run {
        "Backup plan (dry run)"
    } else {
        "Backup"
    };
    println!(
        "{} {}",
        heading.blue().bold(),
        report.destination_root.display().to_string().cyan()
    );

    for target in &report.targets {
        let path = target.target.display().to_string();
        match &target.outcome {
            TargetOutcome::Copied { files, trees, bytes } => {
                println!(
                    "  {} {} ({} files, {} trees, {})",
                    "✓".green().bold(),
                    path,
                    files,
                    trees,
                    format_bytes(*bytes)
                );
            }
            TargetOutcome::Unchanged => {
                println!("  {} {} {}", "=".dimmed(), path, "unchanged".dimmed());
            }
            TargetOutcome::Skipped { reason } => {
                println!("  {} {} {}", "-".yellow(), path, reason.yellow());
            }
            TargetOutcome::Failed { error } => {
                println!("  {} {} {}", "✗".red().bold(), path, error.red());
            }
        }
    }

    println!();
    println!("  Files: {}", report.files_copied().to_string().cyan());
    println!("  Trees: {}", report.trees_copied().to_string().cyan());
    println!("  Size: {}", format_bytes(report.bytes_copied()).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
    if report.has_failures() {
        println!("  Failed: {}", report.failed_count().to_string().red().bold());
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
