use serde::Serialize;
use std::sync::Arc;

use crate::cache::{CacheEntry, CacheState, RefreshController, Source};
use crate::collectors::DeviceCollector;
use crate::config::Config;
use crate::decision::{DecisionEngine, KillCandidate, Recommendation, estimate_freed_mb, usage_ratio};
use crate::enforcement::{Enforcer, KillRecord, TerminationReport};
use crate::error::FetchError;
use crate::gateway::Gateway;
use crate::history::{UsageHistory, UsageSample};

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub entry: Arc<CacheEntry>,
    pub usage_pct: f64,
    pub recommendation: Recommendation,
    pub candidates: Vec<KillCandidate>,
    pub freed_mb: f64,
}

pub struct Monitor {
    controller: RefreshController,
    engine: DecisionEngine,
    enforcer: Enforcer,
    history: UsageHistory,
}

impl Monitor {
    /// Monitor backed by the live device behind `gateway`.
    pub fn new(config: &Config, gateway: Arc<dyn Gateway>) -> Self {
        let collector = DeviceCollector::new(gateway.clone(), config.priority.clone());
        Self::with_source(config, Arc::new(collector), gateway)
    }

    /// Monitor reading from any `Source`; termination still goes through
    /// `gateway`.
    pub fn with_source(config: &Config, source: Arc<dyn Source>, gateway: Arc<dyn Gateway>) -> Self {
        let runtime = &config.runtime;
        Self {
            controller: RefreshController::spawn(
                source,
                runtime.cache_ttl(),
                runtime.first_fetch_timeout(),
            ),
            engine: DecisionEngine::from_config(config),
            enforcer: Enforcer::new(gateway, config.kill.blocklist.clone(), runtime.kill_log_len),
            history: UsageHistory::new(runtime.history_len),
        }
    }

    pub async fn view(&self, force: bool) -> Result<DashboardView, FetchError> {
        let entry = self.controller.get_data(force).await?;
        self.history.record(&entry);

        let usage_pct = usage_ratio(&entry.snapshot);
        let recommendation = self.engine.classify(usage_pct);
        let candidates = self.engine.select_candidates(&entry.processes);
        let freed_mb = estimate_freed_mb(&candidates);

        Ok(DashboardView {
            entry,
            usage_pct,
            recommendation,
            candidates,
            freed_mb,
        })
    }

    /// Force-stop `packages`, then mark the cache stale so the next view
    /// reflects the result.
    pub async fn terminate(&self, packages: &[String]) -> TerminationReport {
        let report = self.enforcer.terminate(packages).await;
        if report.succeeded() > 0 {
            log::info!(
                "[monitor] stopped {}/{} packages",
                report.succeeded(),
                report.outcomes.len()
            );
        }
        self.controller.invalidate();
        report
    }

    pub fn history(&self) -> Vec<UsageSample> {
        self.history.samples()
    }

    pub fn kill_log(&self, limit: usize) -> Vec<KillRecord> {
        self.enforcer.recent(limit)
    }

    pub fn cache_state(&self) -> CacheState {
        self.controller.state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.controller.last_error()
    }
}
