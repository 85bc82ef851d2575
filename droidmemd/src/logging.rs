use crate::config::LoggingConfig;
use env_logger::Env;

/// Target used for every termination request and its outcome.
pub const AUDIT_TARGET: &str = "droidmem_audit";

/// Install the global logger. `RUST_LOG` wins over the configured level.
/// Safe to call more than once; later calls are ignored.
pub fn init(cfg: &LoggingConfig) {
    let env = Env::default().default_filter_or(cfg.level.as_str());
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
    {
        log::debug!("[logging] initialized at level {}", cfg.level);
    }
}
