use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::gateway::Gateway;
use crate::logging::AUDIT_TARGET;

mod safety;

pub use safety::SafetyGuard;

const STOP_MARKER: &str = "droidmem-stopped:";
const PER_PACKAGE_BUDGET: Duration = Duration::from_millis(500);
const BATCH_OVERHEAD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "reason")]
pub enum KillOutcome {
    Stopped,
    Failed(String),
    Refused(String),
}

impl KillOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KillRecord {
    pub at: DateTime<Utc>,
    pub package: String,
    pub outcome: KillOutcome,
}

/// Per-package outcomes: refusals first, then device results in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TerminationReport {
    pub outcomes: Vec<(String, KillOutcome)>,
}

impl TerminationReport {
    pub fn as_map(&self) -> BTreeMap<String, bool> {
        self.outcomes
            .iter()
            .map(|(pkg, outcome)| (pkg.clone(), outcome.is_stopped()))
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_stopped()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub struct Enforcer {
    gateway: Arc<dyn Gateway>,
    guard: SafetyGuard,
    log: Mutex<VecDeque<KillRecord>>,
    capacity: usize,
}

impl Enforcer {
    pub fn new(gateway: Arc<dyn Gateway>, blocklist: BTreeSet<String>, capacity: usize) -> Self {
        Self {
            gateway,
            guard: SafetyGuard::new(blocklist),
            log: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Force-stop each package. Names failing the safety guard are refused
    /// without touching the device; duplicates are stopped once.
    pub async fn terminate(&self, packages: &[String]) -> TerminationReport {
        let mut outcomes = Vec::new();
        let mut allowed: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        for name in packages {
            match self.guard.check(name) {
                Ok(package) => {
                    if seen.insert(package.to_string()) {
                        allowed.push(package.to_string());
                    }
                }
                Err(reason) => outcomes.push((name.clone(), KillOutcome::Refused(reason))),
            }
        }

        let stopped = match allowed.as_slice() {
            [] => Vec::new(),
            [single] => vec![(single.clone(), self.stop_one(single).await)],
            _ => self.stop_batch(&allowed).await,
        };
        outcomes.extend(stopped);

        for (package, outcome) in &outcomes {
            self.record(package, outcome);
        }
        TerminationReport { outcomes }
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<KillRecord> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().rev().take(limit).cloned().collect()
    }

    async fn stop_one(&self, package: &str) -> KillOutcome {
        match self.gateway.run_device(&stop_command(package)).await {
            Ok(output) if confirmed(&output).contains(package) => KillOutcome::Stopped,
            Ok(_) => KillOutcome::Failed("force-stop was not confirmed by the device".to_string()),
            Err(err) => KillOutcome::Failed(err.to_string()),
        }
    }

    async fn stop_batch(&self, packages: &[String]) -> Vec<(String, KillOutcome)> {
        let line = packages
            .iter()
            .map(|p| stop_command(p))
            .collect::<Vec<_>>()
            .join("; ");
        let timeout = batch_timeout(self.gateway.command_timeout(), packages.len());

        match self.gateway.run_device_with_timeout(&line, timeout).await {
            Ok(output) => {
                let confirmed = confirmed(&output);
                packages
                    .iter()
                    .map(|p| {
                        let outcome = if confirmed.contains(p.as_str()) {
                            KillOutcome::Stopped
                        } else {
                            KillOutcome::Failed(
                                "force-stop was not confirmed by the device".to_string(),
                            )
                        };
                        (p.clone(), outcome)
                    })
                    .collect()
            }
            Err(err) => {
                log::warn!("[enforcement] batch of {} failed ({err}), retrying one by one", packages.len());
                let mut outcomes = Vec::with_capacity(packages.len());
                for package in packages {
                    outcomes.push((package.clone(), self.stop_one(package).await));
                }
                outcomes
            }
        }
    }

    fn record(&self, package: &str, outcome: &KillOutcome) {
        match outcome {
            KillOutcome::Stopped => {
                log::warn!(target: AUDIT_TARGET, "FORCE_STOP {package} ok")
            }
            KillOutcome::Failed(reason) => {
                log::warn!(target: AUDIT_TARGET, "FORCE_STOP {package} failed reason={reason}")
            }
            KillOutcome::Refused(reason) => {
                log::warn!(target: AUDIT_TARGET, "FORCE_STOP {package} refused reason={reason}")
            }
        }

        if self.capacity == 0 {
            return;
        }
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        if log.len() == self.capacity {
            log.pop_front();
        }
        log.push_back(KillRecord {
            at: Utc::now(),
            package: package.to_string(),
            outcome: outcome.clone(),
        });
    }
}

fn stop_command(package: &str) -> String {
    format!("am force-stop {package} && echo {STOP_MARKER}{package}")
}

fn confirmed(output: &str) -> HashSet<&str> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(STOP_MARKER))
        .collect()
}

fn batch_timeout(command_timeout: Duration, packages: usize) -> Duration {
    let scaled = PER_PACKAGE_BUDGET * packages as u32 + BATCH_OVERHEAD;
    command_timeout.max(scaled)
}
