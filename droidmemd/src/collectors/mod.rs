pub mod meminfo;
pub mod processes;

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheEntry, Source};
use crate::error::FetchError;
use crate::gateway::{self, Gateway};
use crate::priority::PriorityTable;
use crate::types::{MemorySnapshot, ProcessRecord};

pub use meminfo::{parse_meminfo_dump, parse_proc_meminfo_dump};
pub use processes::{build_inventory, parse_priority_table, parse_size_table};

pub const MEMINFO_COMMAND: &str = "dumpsys meminfo";
pub const PROC_MEMINFO_COMMAND: &str = "cat /proc/meminfo";
pub const ACTIVITY_COMMAND: &str = "dumpsys activity processes";

/// Pulls one complete (snapshot, inventory, device) triple from a device.
pub struct DeviceCollector {
    gateway: Arc<dyn Gateway>,
    priorities: PriorityTable,
}

impl DeviceCollector {
    pub fn new(gateway: Arc<dyn Gateway>, priorities: PriorityTable) -> Self {
        Self {
            gateway,
            priorities,
        }
    }

    /// Snapshot from an already captured `dumpsys meminfo`, or from
    /// `/proc/meminfo` when that dump is in a format we do not recognise.
    pub async fn read_memory(&self, meminfo_dump: &str) -> Result<MemorySnapshot, FetchError> {
        match parse_meminfo_dump(meminfo_dump) {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                info!("[collector] {err}; falling back to {PROC_MEMINFO_COMMAND}");
                let raw = self.gateway.run_device(PROC_MEMINFO_COMMAND).await?;
                Ok(parse_proc_meminfo_dump(&raw)?)
            }
        }
    }

    pub async fn read_processes(&self, meminfo_dump: &str) -> Vec<ProcessRecord> {
        let activity = match self.gateway.run_device(ACTIVITY_COMMAND).await {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!("[collector] priority table unavailable, using defaults: {err}");
                None
            }
        };
        build_inventory(meminfo_dump, activity.as_deref(), &self.priorities)
    }
}

#[async_trait]
impl Source for DeviceCollector {
    async fn fetch(&self) -> Result<CacheEntry, FetchError> {
        let started = Instant::now();
        // One dump feeds both the snapshot and the size table.
        let meminfo_dump = self.gateway.run_device(MEMINFO_COMMAND).await?;
        let snapshot = self.read_memory(&meminfo_dump).await?;
        let processes = self.read_processes(&meminfo_dump).await;
        let device = gateway::device_info(self.gateway.as_ref()).await;

        debug!(
            "[collector] fetched {} processes from {} in {:?}",
            processes.len(),
            device.model,
            started.elapsed()
        );
        Ok(CacheEntry::new(snapshot, processes, device))
    }
}
