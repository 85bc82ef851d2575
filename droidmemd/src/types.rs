use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide RAM figures from one dump, all in kilobytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub total_kb: u64,
    pub used_kb: u64,
    pub free_kb: u64,
    pub lost_kb: u64,
    // "normal" | "moderate" | "low" | "critical" as reported by the device
    pub status: String,
    pub captured_at: DateTime<Utc>,
}

impl MemorySnapshot {
    pub const NEUTRAL_STATUS: &'static str = "normal";

    pub fn used_mb(&self) -> f64 {
        kb_to_mb(self.used_kb)
    }

    pub fn free_mb(&self) -> f64 {
        kb_to_mb(self.free_kb)
    }

    pub fn total_mb(&self) -> f64 {
        kb_to_mb(self.total_kb)
    }
}

/// One running process as seen by a single fetch. Pids are not stable
/// across fetches, so records are never carried over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub package: String,
    pub pss_kb: u64,
    pub priority_code: String,
    pub priority_label: String,
    pub kill_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ProcessRecord {
    pub fn pss_mb(&self) -> f64 {
        kb_to_mb(self.pss_kb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub android_version: String,
}

impl DeviceInfo {
    pub const UNKNOWN: &'static str = "Unknown";
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            model: Self::UNKNOWN.to_string(),
            android_version: Self::UNKNOWN.to_string(),
        }
    }
}

/// An entry of the host `devices` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedDevice {
    pub serial: String,
    pub state: String,
}

impl AttachedDevice {
    pub fn is_authorized(&self) -> bool {
        self.state == "device"
    }
}

/// Kilobytes to megabytes, rounded to one decimal.
pub fn kb_to_mb(kb: u64) -> f64 {
    (kb as f64 / 1024.0 * 10.0).round() / 10.0
}
