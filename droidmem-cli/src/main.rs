use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;

use droidmemd::config::Config;
use droidmemd::decision::Severity;
use droidmemd::enforcement::KillOutcome;
use droidmemd::{AdbGateway, DashboardView, Gateway, Monitor, TerminationReport, logging};

mod doctor;
mod processes;
mod watch;

#[derive(clap::Parser, Debug)]
#[clap(version, about = "Android memory-pressure monitor over adb")]
struct Args {
    /// Config file (defaults to $DROIDMEM_CONFIG, then built-in defaults)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Path to the adb executable
    #[clap(long)]
    adb: Option<PathBuf>,

    /// Target device serial when several are attached
    #[clap(long, short = 's')]
    serial: Option<String>,

    /// Disable colorized output
    #[clap(long)]
    no_color: bool,

    /// Print JSON instead of text
    #[clap(long)]
    json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Check adb, attached devices and device properties
    Doctor,
    /// Memory snapshot and pressure classification
    Status,
    /// Running processes with size and priority
    Processes,
    /// Ranked processes that are safe to stop
    Candidates,
    /// Force-stop packages
    Kill {
        /// Package names
        #[clap(required_unless_present = "all", conflicts_with = "all")]
        packages: Vec<String>,
        /// Stop every current candidate
        #[clap(long)]
        all: bool,
    },
    /// Auto-refreshing status line
    Watch {
        /// Redraw interval (defaults to runtime.refresh_interval_ms)
        #[clap(long)]
        interval_ms: Option<u64>,
        /// Stop after this many refreshes
        #[clap(long)]
        count: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(adb) = &args.adb {
        config.adb.path = Some(adb.clone());
    }
    if let Some(serial) = &args.serial {
        config.adb.serial = Some(serial.clone());
    }
    config.validate()?;
    logging::init(&config.logging);

    let adb = AdbGateway::from_config(&config.adb, config.runtime.command_timeout());
    let gateway: Arc<dyn Gateway> = Arc::new(adb.clone());

    // Nothing touches the device until the first view.
    let monitor = Monitor::new(&config, gateway.clone());
    match args.command {
        Command::Doctor => doctor::run_doctor(&adb, args.json).await?,
        Command::Status => {
            let view = fetch(&monitor).await?;
            if args.json {
                print_json(&view)?;
            } else {
                print_status(&view);
            }
        }
        Command::Processes => {
            let view = fetch(&monitor).await?;
            if args.json {
                print_json(&view.entry.processes)?;
            } else {
                processes::print_processes(&view.entry.processes);
            }
        }
        Command::Candidates => {
            let view = fetch(&monitor).await?;
            if args.json {
                print_json(&serde_json::json!({
                    "candidates": view.candidates,
                    "freed_mb": view.freed_mb,
                }))?;
            } else {
                processes::print_candidates(&view.candidates, view.freed_mb);
            }
        }
        Command::Kill { packages, all } => {
            let packages = if all {
                let view = fetch(&monitor).await?;
                view.candidates.iter().map(|c| c.package.clone()).collect()
            } else {
                packages
            };
            if packages.is_empty() {
                println!("{}", "Nothing to stop.".dimmed());
                return Ok(());
            }
            let report = monitor.terminate(&packages).await;
            if args.json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            if report.succeeded() == 0 {
                bail!("no package was stopped");
            }
        }
        Command::Watch { interval_ms, count } => {
            let interval = interval_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| config.runtime.refresh_interval());
            watch::run_watch(&monitor, interval, count, args.json).await?;
        }
    }

    Ok(())
}

async fn fetch(monitor: &Monitor) -> Result<DashboardView> {
    monitor
        .view(false)
        .await
        .context("unable to read memory state from device")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::Warning => Color::Yellow,
        Severity::Healthy => Color::Green,
    }
}

fn print_status(view: &DashboardView) {
    let entry = &view.entry;
    let snap = &entry.snapshot;
    let color = severity_color(view.recommendation.severity);

    println!(
        "{} {} (Android {})",
        "Device:".bold(),
        entry.device.model,
        entry.device.android_version
    );
    println!(
        "{} {:.1} / {:.1} MB used ({}), {:.1} MB free, lost {:.1} MB, status {}",
        "Memory:".bold(),
        snap.used_mb(),
        snap.total_mb(),
        format!("{:.1} %", view.usage_pct).color(color).bold(),
        snap.free_mb(),
        droidmemd::types::kb_to_mb(snap.lost_kb),
        snap.status
    );
    println!();
    println!("{}", view.recommendation.title.color(color).bold());
    println!("  {}", view.recommendation.detail);
    println!();
    println!(
        "{} {} ({:.1} MB reclaimable)",
        "Candidates:".bold(),
        view.candidates.len(),
        view.freed_mb
    );
}

fn print_report(report: &TerminationReport) {
    for (package, outcome) in &report.outcomes {
        match outcome {
            KillOutcome::Stopped => println!("{} {package}", "stopped ".green()),
            KillOutcome::Failed(reason) => {
                println!("{} {package}: {reason}", "failed  ".red())
            }
            KillOutcome::Refused(reason) => {
                println!("{} {package}: {reason}", "refused ".yellow())
            }
        }
    }
    println!(
        "{}",
        format!("{}/{} stopped", report.succeeded(), report.outcomes.len()).bold()
    );
}
