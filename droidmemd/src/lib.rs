pub mod cache;
pub mod collectors;
pub mod config;
pub mod decision;
pub mod enforcement;
pub mod error;
pub mod gateway;
pub mod history;
pub mod logging;
pub mod monitor;
pub mod priority;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, CacheState, RefreshController, Source};
pub use config::{Config, LoggingConfig, RuntimeConfig};
pub use decision::{DecisionEngine, KillCandidate, Recommendation, Severity};
pub use enforcement::{KillOutcome, KillRecord, TerminationReport};
pub use error::{FetchError, GatewayError, ParseError};
pub use gateway::{AdbGateway, Gateway};
pub use monitor::{DashboardView, Monitor};
pub use types::{AttachedDevice, DeviceInfo, MemorySnapshot, ProcessRecord};
