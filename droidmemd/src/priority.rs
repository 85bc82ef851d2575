//! OOM priority codes as printed by `dumpsys activity processes`.
//!
//! Each short code maps to a human label and a kill-score in `0..=MAX_SCORE`
//! (0 = never kill, higher = safer to kill). Unknown codes resolve to the
//! table's single default entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_SCORE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityClass {
    pub label: String,
    pub score: u8,
}

impl PriorityClass {
    fn new(label: &str, score: u8) -> Self {
        Self {
            label: label.to_string(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityTable {
    pub codes: HashMap<String, PriorityClass>,
    pub default: PriorityClass,
    /// Code assumed for packages missing from the priority dump.
    pub fallback_code: String,
}

impl Default for PriorityTable {
    fn default() -> Self {
        let codes = [
            ("fore", "Foreground", 0),
            ("fg", "Foreground", 0),
            ("vis", "Visible", 1),
            ("percep", "Perceptible", 2),
            ("prev", "Previous", 3),
            ("bak", "Background", 4),
            ("cch", "Cached", 5),
            ("svc", "Service", 2),
            ("svcb", "Service-B", 3),
            ("psvc", "Persist-Svc", 0),
            ("home", "Home", 1),
            ("pers", "Persistent", 0),
            ("sys", "System", 0),
        ]
        .into_iter()
        .map(|(code, label, score)| (code.to_string(), PriorityClass::new(label, score)))
        .collect();

        Self {
            codes,
            default: PriorityClass::new("Unknown", 3),
            fallback_code: "bak".to_string(),
        }
    }
}

impl PriorityTable {
    pub fn lookup(&self, code: &str) -> &PriorityClass {
        self.codes
            .get(code)
            .or_else(|| self.codes.get(&code.to_ascii_lowercase()))
            .unwrap_or(&self.default)
    }

    pub fn score(&self, code: &str) -> u8 {
        self.lookup(code).score
    }

    pub fn fallback(&self) -> &PriorityClass {
        self.lookup(&self.fallback_code)
    }
}
