use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;

use crate::config::{Config, RecommendationConfig, RecommendationText, ThresholdConfig};
use crate::types::{MemorySnapshot, ProcessRecord, kb_to_mb};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub title: String,
    pub detail: String,
}

/// A process that cleared both the score floor and the blocklist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct KillCandidate(ProcessRecord);

impl Deref for KillCandidate {
    type Target = ProcessRecord;

    fn deref(&self) -> &ProcessRecord {
        &self.0
    }
}

/// `used / total * 100`, or exactly 0 for a degenerate zero-total snapshot.
pub fn usage_ratio(snapshot: &MemorySnapshot) -> f64 {
    if snapshot.total_kb == 0 {
        return 0.0;
    }
    snapshot.used_kb as f64 / snapshot.total_kb as f64 * 100.0
}

/// Usage rounded to the one decimal that is displayed. Severity is decided
/// on this value so the label never disagrees with the printed percentage.
pub fn display_pct(usage_pct: f64) -> f64 {
    (usage_pct * 10.0).round() / 10.0
}

/// Sum of candidate PSS in MB, one decimal.
pub fn estimate_freed_mb(candidates: &[KillCandidate]) -> f64 {
    kb_to_mb(candidates.iter().map(|c| c.pss_kb).sum())
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    thresholds: ThresholdConfig,
    wording: RecommendationConfig,
    min_kill_score: u8,
    blocklist: BTreeSet<String>,
}

impl DecisionEngine {
    pub fn new(
        thresholds: ThresholdConfig,
        wording: RecommendationConfig,
        min_kill_score: u8,
        blocklist: BTreeSet<String>,
    ) -> Self {
        Self {
            thresholds,
            wording,
            min_kill_score,
            blocklist,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.thresholds,
            config.recommendations.clone(),
            config.kill.min_score,
            config.kill.blocklist.clone(),
        )
    }

    pub fn severity(&self, usage_pct: f64) -> Severity {
        let pct = display_pct(usage_pct);
        if pct >= self.thresholds.critical_pct {
            Severity::Critical
        } else if pct >= self.thresholds.warning_pct {
            Severity::Warning
        } else {
            Severity::Healthy
        }
    }

    pub fn classify(&self, usage_pct: f64) -> Recommendation {
        let severity = self.severity(usage_pct);
        let text = match severity {
            Severity::Critical => &self.wording.critical,
            Severity::Warning => &self.wording.warning,
            Severity::Healthy => &self.wording.healthy,
        };
        render(severity, text, usage_pct)
    }

    pub fn is_blocklisted(&self, package: &str) -> bool {
        self.blocklist.contains(package)
    }

    /// Processes at or above the score floor and off the blocklist, largest
    /// PSS first. Equal sizes keep their input order.
    pub fn select_candidates(&self, processes: &[ProcessRecord]) -> Vec<KillCandidate> {
        let mut candidates: Vec<KillCandidate> = processes
            .iter()
            .filter(|p| p.kill_score >= self.min_kill_score && !self.is_blocklisted(&p.package))
            .cloned()
            .map(KillCandidate)
            .collect();
        candidates.sort_by(|a, b| b.pss_kb.cmp(&a.pss_kb));
        candidates
    }
}

fn render(severity: Severity, text: &RecommendationText, usage_pct: f64) -> Recommendation {
    Recommendation {
        severity,
        title: text.title.clone(),
        detail: text.detail.replace("{usage}", &format!("{usage_pct:.1}")),
    }
}
