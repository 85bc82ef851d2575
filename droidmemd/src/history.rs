use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::cache::CacheEntry;
use crate::decision::usage_ratio;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSample {
    pub captured_at: DateTime<Utc>,
    pub used_mb: f64,
    pub free_mb: f64,
    pub usage_pct: f64,
}

/// Rolling window of memory samples, one per distinct cache entry.
pub struct UsageHistory {
    inner: Mutex<VecDeque<UsageSample>>,
    capacity: usize,
}

impl UsageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample for `entry` unless it is the one recorded last.
    pub fn record(&self, entry: &CacheEntry) {
        if self.capacity == 0 {
            return;
        }
        let snapshot = &entry.snapshot;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner
            .back()
            .is_some_and(|last| last.captured_at == snapshot.captured_at)
        {
            return;
        }
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(UsageSample {
            captured_at: snapshot.captured_at,
            used_mb: snapshot.used_mb(),
            free_mb: snapshot.free_mb(),
            usage_pct: usage_ratio(snapshot),
        });
    }

    /// Oldest first.
    pub fn samples(&self) -> Vec<UsageSample> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
