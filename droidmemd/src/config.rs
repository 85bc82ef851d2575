use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::priority::{MAX_SCORE, PriorityTable};

pub const CONFIG_ENV: &str = "DROIDMEM_CONFIG";
pub const ADB_ENV: &str = "DROIDMEM_ADB";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub adb: AdbConfig,
    pub thresholds: ThresholdConfig,
    pub recommendations: RecommendationConfig,
    pub priority: PriorityTable,
    pub kill: KillConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub refresh_interval_ms: u64,
    pub command_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    /// Added to the command timeout to bound the very first blocking read.
    pub first_fetch_grace_secs: u64,
    pub history_len: usize,
    pub kill_log_len: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 30_000,
            command_timeout_secs: 10,
            cache_ttl_secs: 25,
            first_fetch_grace_secs: 5,
            history_len: 120,
            kill_log_len: 200,
        }
    }
}

impl RuntimeConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn first_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs + self.first_fetch_grace_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    pub path: Option<PathBuf>,
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub warning_pct: f64,
    pub critical_pct: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            warning_pct: 60.0,
            critical_pct: 80.0,
        }
    }
}

/// Title and detail text for one severity. `{usage}` in the detail is
/// replaced with the usage percentage formatted to one decimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationText {
    pub title: String,
    pub detail: String,
}

impl RecommendationText {
    fn new(title: &str, detail: &str) -> Self {
        Self {
            title: title.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub critical: RecommendationText,
    pub warning: RecommendationText,
    pub healthy: RecommendationText,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            critical: RecommendationText::new(
                "High Memory Pressure",
                "RAM usage is at {usage} %. Recommend killing low-priority background apps \
                 immediately to prevent system slowdown and app crashes.",
            ),
            warning: RecommendationText::new(
                "Moderate Memory Usage",
                "RAM usage is at {usage} %. Consider closing unused background apps to keep \
                 the device responsive.",
            ),
            healthy: RecommendationText::new(
                "Memory Healthy",
                "RAM usage is at {usage} %. The device has adequate free memory. No action required.",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillConfig {
    pub min_score: u8,
    pub blocklist: BTreeSet<String>,
}

impl Default for KillConfig {
    fn default() -> Self {
        let blocklist = [
            "system",
            "system_server",
            "com.android.systemui",
            "com.android.launcher3",
            "com.google.android.launcher",
            "com.android.phone",
            "com.android.dialer",
            "com.android.providers.telephony",
            "com.android.providers.contacts",
            "com.android.settings",
            "com.android.inputmethod.latin",
            "android",
            "android.process.acore",
            "android.process.media",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            min_score: 3,
            blocklist,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("invalid droidmem config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Explicit path, then `DROIDMEM_CONFIG`, then built-in defaults.
    /// `DROIDMEM_ADB` replaces the adb path whichever source was used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                log::info!("[config] loading {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        if let Some(adb) = env::var_os(ADB_ENV) {
            config.adb.path = Some(PathBuf::from(adb));
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [("warning_pct", t.warning_pct), ("critical_pct", t.critical_pct)] {
            if !(0.0..=100.0).contains(&value) {
                bail!("thresholds.{name} must be within 0..=100, got {value}");
            }
        }
        if t.warning_pct >= t.critical_pct {
            bail!(
                "thresholds.warning_pct ({}) must be below critical_pct ({})",
                t.warning_pct,
                t.critical_pct
            );
        }
        if self.runtime.command_timeout_secs == 0 {
            bail!("runtime.command_timeout_secs must be positive");
        }
        if self.kill.min_score > MAX_SCORE {
            bail!("kill.min_score must be at most {MAX_SCORE}");
        }
        if self.priority.default.score > MAX_SCORE {
            bail!("priority.default.score must be at most {MAX_SCORE}");
        }
        if let Some((code, _)) = self
            .priority
            .codes
            .iter()
            .find(|(_, class)| class.score > MAX_SCORE)
        {
            bail!("priority.codes.{code}.score must be at most {MAX_SCORE}");
        }
        if self.priority.fallback().score >= MAX_SCORE {
            bail!(
                "priority.fallback_code `{}` must not map to the maximal kill-score",
                self.priority.fallback_code
            );
        }
        Ok(())
    }
}
