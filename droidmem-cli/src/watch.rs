use anyhow::Result;
use colored::*;
use std::time::Duration;

use droidmemd::{CacheState, DashboardView, Monitor};

use crate::severity_color;

fn status_line(view: &DashboardView, state: CacheState) -> String {
    let snap = &view.entry.snapshot;
    let severity = view.recommendation.severity;
    let pending = match state {
        CacheState::Fetching => " refreshing…".dimmed().to_string(),
        _ => String::new(),
    };
    format!(
        "[{}] {} {:>6} {:.1}/{:.1} MB  candidates {} (~{:.1} MB)  age {}s{}",
        chrono::Local::now().format("%H:%M:%S"),
        format!("{:<8}", severity.as_str()).color(severity_color(severity)).bold(),
        format!("{:.1}%", view.usage_pct),
        snap.used_mb(),
        snap.total_mb(),
        view.candidates.len(),
        view.freed_mb,
        view.entry.age().as_secs(),
        pending
    )
}

/// Poll the monitor every `interval` until `count` views were printed or
/// Ctrl-C. Reads never wait on the device once the first fetch landed.
pub async fn run_watch(
    monitor: &Monitor,
    interval: Duration,
    count: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut printed = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        match monitor.view(false).await {
            Ok(view) if json => println!("{}", serde_json::to_string(&view)?),
            Ok(view) => println!("{}", status_line(&view, monitor.cache_state())),
            Err(err) => eprintln!("{} {err}", "error:".red().bold()),
        }

        printed += 1;
        if count.is_some_and(|limit| printed >= limit) {
            break;
        }
    }
    Ok(())
}
