//! Single-slot fetch cache with a background refresh worker.
//!
//! Readers get `Arc` handles to whole entries, so a snapshot is never paired
//! with a process list from a different cycle. A refresh request that
//! arrives while a fetch is running is dropped.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::error::FetchError;
use crate::types::{DeviceInfo, MemorySnapshot, ProcessRecord};

/// One consistent capture of the device.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub snapshot: MemorySnapshot,
    pub processes: Vec<ProcessRecord>,
    pub device: DeviceInfo,
    #[serde(skip)]
    fetched_at: Instant,
}

impl CacheEntry {
    pub fn new(snapshot: MemorySnapshot, processes: Vec<ProcessRecord>, device: DeviceInfo) -> Self {
        Self {
            snapshot,
            processes,
            device,
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Anything that can produce a complete cache entry.
#[async_trait]
pub trait Source: Send + Sync {
    async fn fetch(&self) -> Result<CacheEntry, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Fetching,
    Populated,
}

#[derive(Debug, Default)]
struct Slot {
    entry: Option<Arc<CacheEntry>>,
    /// Completed fetches, successful or not.
    attempts: u64,
    last_error: Option<String>,
}

struct Flags {
    in_flight: AtomicBool,
    stale: AtomicBool,
}

pub struct RefreshController {
    slot: watch::Receiver<Slot>,
    requests: mpsc::Sender<()>,
    flags: Arc<Flags>,
    ttl: Duration,
    first_fetch_timeout: Duration,
}

impl RefreshController {
    /// Start the worker. Must be called inside a tokio runtime; the worker
    /// exits once the controller is dropped.
    pub fn spawn(source: Arc<dyn Source>, ttl: Duration, first_fetch_timeout: Duration) -> Self {
        let (slot_tx, slot_rx) = watch::channel(Slot::default());
        let (requests_tx, requests_rx) = mpsc::channel(1);
        let flags = Arc::new(Flags {
            in_flight: AtomicBool::new(false),
            stale: AtomicBool::new(false),
        });

        tokio::spawn(run_worker(source, slot_tx, requests_rx, flags.clone()));

        Self {
            slot: slot_rx,
            requests: requests_tx,
            flags,
            ttl,
            first_fetch_timeout,
        }
    }

    /// Return the cached entry, scheduling a background refresh when it is
    /// older than the TTL, invalidated or `force` is set.
    ///
    /// Once any entry exists this never waits on the device. Before that, it
    /// waits for the first fetch to finish, bounded by the first-fetch
    /// timeout.
    pub async fn get_data(&self, force: bool) -> Result<Arc<CacheEntry>, FetchError> {
        let (current, seen) = {
            let slot = self.slot.borrow();
            (slot.entry.clone(), slot.attempts)
        };

        let expired = current.as_ref().is_none_or(|e| e.age() >= self.ttl);
        if force || expired || self.flags.stale.load(Ordering::SeqCst) {
            self.trigger();
        }

        if let Some(entry) = current {
            return Ok(entry);
        }

        let mut slot = self.slot.clone();
        let waited = tokio::time::timeout(
            self.first_fetch_timeout,
            slot.wait_for(|s| s.entry.is_some() || s.attempts > seen),
        )
        .await;

        match waited {
            Err(_) => {
                warn!(
                    "[cache] no data after {:?}, giving up on first fetch",
                    self.first_fetch_timeout
                );
                Err(FetchError::FirstFetchTimeout(self.first_fetch_timeout))
            }
            Ok(Err(_)) => Err(FetchError::WorkerStopped),
            Ok(Ok(slot)) => match &slot.entry {
                Some(entry) => Ok(entry.clone()),
                None => Err(FetchError::FirstFetchFailed(
                    slot.last_error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                )),
            },
        }
    }

    /// Last populated entry without scheduling anything.
    pub fn latest(&self) -> Option<Arc<CacheEntry>> {
        self.slot.borrow().entry.clone()
    }

    /// Mark the entry stale so the next read refreshes. The entry itself is
    /// kept and keeps being served until the refresh lands.
    pub fn invalidate(&self) {
        debug!("[cache] invalidated");
        self.flags.stale.store(true, Ordering::SeqCst);
    }

    pub fn is_refreshing(&self) -> bool {
        self.flags.in_flight.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CacheState {
        if self.is_refreshing() {
            CacheState::Fetching
        } else if self.slot.borrow().entry.is_some() {
            CacheState::Populated
        } else {
            CacheState::Empty
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.slot.borrow().last_error.clone()
    }

    /// Queue a refresh unless one is already running. Returns whether a new
    /// refresh was queued.
    pub fn trigger(&self) -> bool {
        if self
            .flags
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.requests.try_send(()).is_err() {
            self.flags.in_flight.store(false, Ordering::SeqCst);
            return false;
        }
        self.flags.stale.store(false, Ordering::SeqCst);
        true
    }
}

async fn run_worker(
    source: Arc<dyn Source>,
    slot: watch::Sender<Slot>,
    mut requests: mpsc::Receiver<()>,
    flags: Arc<Flags>,
) {
    while requests.recv().await.is_some() {
        let started = Instant::now();
        let fetcher = source.clone();
        // A panicking source surfaces as a failed cycle instead of killing
        // the worker with the in-flight flag still set.
        let result = match tokio::spawn(async move { fetcher.fetch().await }).await {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(join) => Err(format!("refresh task aborted: {join}")),
        };

        let failed = result.is_err();
        match &result {
            Ok(entry) => info!(
                "[cache] refreshed {} processes in {:?}",
                entry.processes.len(),
                started.elapsed()
            ),
            Err(err) => warn!("[cache] refresh failed, keeping previous data: {err}"),
        }

        slot.send_modify(|slot| {
            slot.attempts += 1;
            match result {
                Ok(entry) => {
                    slot.entry = Some(Arc::new(entry));
                    slot.last_error = None;
                }
                Err(err) => slot.last_error = Some(err),
            }
        });

        if failed {
            flags.stale.store(true, Ordering::SeqCst);
        }
        flags.in_flight.store(false, Ordering::SeqCst);
    }
    debug!("[cache] refresh worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Replays scripted outcomes; each fetch waits for a permit so tests can
    /// hold a refresh in flight.
    struct ScriptedSource {
        outcomes: Mutex<VecDeque<Result<u64, String>>>,
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<Result<u64, String>>, permits: usize) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                gate: Semaphore::new(permits),
                calls: AtomicUsize::new(0),
            })
        }

        fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn entry(used_kb: u64) -> CacheEntry {
        let snapshot = MemorySnapshot {
            total_kb: 1_000,
            used_kb,
            free_kb: 1_000 - used_kb,
            lost_kb: 0,
            status: "normal".to_string(),
            captured_at: Utc::now(),
        };
        CacheEntry::new(snapshot, Vec::new(), DeviceInfo::default())
    }

    #[async_trait]
    impl Source for ScriptedSource {
        async fn fetch(&self) -> Result<CacheEntry, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err("script exhausted".to_string()));
            next.map(entry).map_err(FetchError::FirstFetchFailed)
        }
    }

    fn controller(source: Arc<ScriptedSource>, ttl: Duration) -> RefreshController {
        RefreshController::spawn(source, ttl, Duration::from_secs(2))
    }

    async fn settle(controller: &RefreshController) {
        for _ in 0..200 {
            if !controller.is_refreshing() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("refresh never finished");
    }

    #[tokio::test]
    async fn test_first_read_blocks_until_populated() {
        let source = ScriptedSource::new(vec![Ok(400)], 1);
        let cache = controller(source.clone(), Duration::from_secs(60));
        assert_eq!(cache.state(), CacheState::Empty);

        let entry = cache.get_data(false).await.unwrap();
        assert_eq!(entry.snapshot.used_kb, 400);
        settle(&cache).await;
        assert_eq!(cache.state(), CacheState::Populated);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_first_read_failure_surfaces() {
        let source = ScriptedSource::new(vec![Err("device offline".to_string())], 1);
        let cache = controller(source, Duration::from_secs(60));

        let err = cache.get_data(false).await.unwrap_err();
        match err {
            FetchError::FirstFetchFailed(msg) => assert!(msg.contains("device offline"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(cache.latest().is_none());
    }

    #[tokio::test]
    async fn test_first_read_times_out() {
        let source = ScriptedSource::new(vec![Ok(400)], 0);
        let cache = RefreshController::spawn(
            source.clone(),
            Duration::from_secs(60),
            Duration::from_millis(50),
        );

        let err = cache.get_data(false).await.unwrap_err();
        assert!(matches!(err, FetchError::FirstFetchTimeout(_)));
        assert!(cache.is_refreshing());

        // The stuck fetch still lands later.
        source.release(1);
        settle(&cache).await;
        assert_eq!(cache.latest().unwrap().snapshot.used_kb, 400);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_on_inflight_refresh() {
        let source = ScriptedSource::new(vec![Ok(100), Ok(200)], 1);
        let cache = controller(source.clone(), Duration::from_secs(60));
        cache.get_data(false).await.unwrap();
        settle(&cache).await;

        // Forced refresh now parks on the gate.
        let first = cache.get_data(true).await.unwrap();
        assert_eq!(first.snapshot.used_kb, 100);
        assert!(cache.is_refreshing());

        while source.calls() < 2 {
            tokio::task::yield_now().await;
        }
        for _ in 0..8 {
            let entry = tokio::time::timeout(Duration::from_millis(50), cache.get_data(true))
                .await
                .expect("read blocked behind refresh")
                .unwrap();
            assert_eq!(entry.snapshot.used_kb, 100);
        }
        assert_eq!(source.calls(), 2, "extra refreshes were started");

        source.release(1);
        settle(&cache).await;
        assert_eq!(cache.latest().unwrap().snapshot.used_kb, 200);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entry() {
        let source = ScriptedSource::new(vec![Ok(100), Err("timeout".to_string()), Ok(300)], 3);
        let cache = controller(source.clone(), Duration::from_secs(60));
        cache.get_data(false).await.unwrap();
        settle(&cache).await;

        let entry = cache.get_data(true).await.unwrap();
        assert_eq!(entry.snapshot.used_kb, 100);
        settle(&cache).await;
        assert_eq!(cache.latest().unwrap().snapshot.used_kb, 100);
        assert_eq!(cache.last_error().as_deref(), Some("unable to fetch data from device: timeout"));

        // Failure marks the entry stale, so a plain read retries.
        cache.get_data(false).await.unwrap();
        settle(&cache).await;
        assert_eq!(cache.latest().unwrap().snapshot.used_kb, 300);
        assert!(cache.last_error().is_none());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_keeps_entry_and_refreshes() {
        let source = ScriptedSource::new(vec![Ok(100), Ok(250)], 2);
        let cache = controller(source.clone(), Duration::from_secs(60));
        cache.get_data(false).await.unwrap();
        settle(&cache).await;

        // Fresh entry: no refresh.
        cache.get_data(false).await.unwrap();
        settle(&cache).await;
        assert_eq!(source.calls(), 1);

        cache.invalidate();
        assert_eq!(cache.latest().unwrap().snapshot.used_kb, 100);
        let served = cache.get_data(false).await.unwrap();
        assert_eq!(served.snapshot.used_kb, 100);
        settle(&cache).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.latest().unwrap().snapshot.used_kb, 250);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_refresh() {
        let source = ScriptedSource::new(vec![Ok(100), Ok(150)], 2);
        let cache = controller(source.clone(), Duration::from_millis(20));
        cache.get_data(false).await.unwrap();
        settle(&cache).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let served = cache.get_data(false).await.unwrap();
        assert_eq!(served.snapshot.used_kb, 100);
        settle(&cache).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_trigger_is_noop_while_in_flight() {
        let source = ScriptedSource::new(vec![Ok(100)], 0);
        let cache = controller(source.clone(), Duration::from_secs(60));
        assert!(cache.trigger());
        assert!(!cache.trigger());
        assert_eq!(cache.state(), CacheState::Fetching);
        source.release(1);
        settle(&cache).await;
        assert!(cache.trigger());
    }

    #[tokio::test]
    async fn test_rejected_trigger_keeps_invalidation() {
        let (_slot_tx, slot_rx) = watch::channel(Slot::default());
        let (requests_tx, requests_rx) = mpsc::channel(1);
        drop(requests_rx);
        let cache = RefreshController {
            slot: slot_rx,
            requests: requests_tx,
            flags: Arc::new(Flags {
                in_flight: AtomicBool::new(false),
                stale: AtomicBool::new(false),
            }),
            ttl: Duration::from_secs(60),
            first_fetch_timeout: Duration::from_millis(50),
        };

        cache.invalidate();
        assert!(!cache.trigger());
        assert!(!cache.is_refreshing());
        assert!(cache.flags.stale.load(Ordering::SeqCst));
    }
}
