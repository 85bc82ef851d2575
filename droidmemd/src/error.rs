use std::time::Duration;
use thiserror::Error;

/// Failure of a single bridge-tool invocation.
///
/// Every variant is transient from the caller's point of view: the refresh
/// controller keeps serving the last good entry and retries on a later cycle.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("adb executable not found ({path}); install Android platform-tools and add them to PATH")]
    NotFound { path: String },
    #[error("failed to launch `{command}`: {message}")]
    Spawn { command: String, message: String },
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// A dump did not contain the fields any known format requires.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{dump}: no known format matched (missing {missing})")]
    MissingFields {
        dump: &'static str,
        missing: String,
    },
    #[error("{dump}: empty output")]
    EmptyDump { dump: &'static str },
}

/// Failure of a whole refresh cycle, or of the blocking first read.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no data from device within {0:?}")]
    FirstFetchTimeout(Duration),
    #[error("unable to fetch data from device: {0}")]
    FirstFetchFailed(String),
    #[error("refresh worker stopped")]
    WorkerStopped,
}
