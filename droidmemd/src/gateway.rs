use async_trait::async_trait;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::AdbConfig;
use crate::error::GatewayError;
use crate::types::{AttachedDevice, DeviceInfo};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[cfg(windows)]
const ADB_EXE: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_EXE: &str = "adb";

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Run a bridge-tool command that does not target the device shell.
    async fn run_host(&self, args: &[&str]) -> Result<String, GatewayError>;

    /// Run `command_line` inside the device shell and return its stdout.
    async fn run_device_with_timeout(
        &self,
        command_line: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError>;

    fn command_timeout(&self) -> Duration;

    async fn run_device(&self, command_line: &str) -> Result<String, GatewayError> {
        self.run_device_with_timeout(command_line, self.command_timeout())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct AdbGateway {
    adb: PathBuf,
    serial: Option<String>,
    timeout: Duration,
}

impl AdbGateway {
    pub fn new(adb: PathBuf, serial: Option<String>, timeout: Duration) -> Self {
        Self {
            adb,
            serial,
            timeout,
        }
    }

    pub fn from_config(cfg: &AdbConfig, timeout: Duration) -> Self {
        let adb = resolve_adb(cfg.path.as_deref());
        debug!("[gateway] using {}", adb.display());
        Self::new(adb, cfg.serial.clone(), timeout)
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb
    }

    async fn execute(&self, args: Vec<String>, timeout: Duration) -> Result<String, GatewayError> {
        let display = format!("adb {}", args.join(" "));
        let mut cmd = Command::new(&self.adb);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let child = cmd.spawn().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => GatewayError::NotFound {
                path: self.adb.display().to_string(),
            },
            _ => GatewayError::Spawn {
                command: display.clone(),
                message: err.to_string(),
            },
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| GatewayError::Timeout {
                command: display.clone(),
                timeout,
            })?
            .map_err(|err| GatewayError::Spawn {
                command: display.clone(),
                message: err.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() && !stderr.is_empty() {
            warn!("[gateway] {display} failed: {stderr}");
            return Err(GatewayError::CommandFailed {
                command: display,
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Gateway for AdbGateway {
    async fn run_host(&self, args: &[&str]) -> Result<String, GatewayError> {
        let args = args.iter().map(|a| a.to_string()).collect();
        self.execute(args, self.timeout).await
    }

    async fn run_device_with_timeout(
        &self,
        command_line: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let mut args = Vec::with_capacity(4);
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.push("shell".to_string());
        args.push(command_line.to_string());
        self.execute(args, timeout).await
    }

    fn command_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Explicit path, then `PATH`, then conventional SDK locations, then a bare
/// `adb` that fails loudly at spawn time if it really is missing.
pub fn resolve_adb(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(found) = which::which(ADB_EXE) {
        return found;
    }
    first_existing(&conventional_locations()).unwrap_or_else(|| PathBuf::from(ADB_EXE))
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

fn conventional_locations() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .into_iter()
        .filter_map(std::env::var_os)
        .map(PathBuf::from)
        .collect();

    if cfg!(windows) {
        if let Some(local) = dirs::data_local_dir() {
            roots.push(local.join("Android").join("Sdk"));
            roots.push(local.join("Android"));
        }
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Android"));
        }
        if let Some(program_files) = std::env::var_os("PROGRAMFILES") {
            roots.push(PathBuf::from(program_files).join("Android"));
        }
    } else if cfg!(target_os = "macos") {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Library").join("Android").join("sdk"));
        }
    } else if let Some(home) = dirs::home_dir() {
        roots.push(home.join("Android").join("Sdk"));
    }

    let mut candidates: Vec<PathBuf> = roots
        .into_iter()
        .map(|root| root.join("platform-tools").join(ADB_EXE))
        .collect();

    if !cfg!(windows) {
        candidates.push(PathBuf::from("/opt/homebrew/bin/adb"));
        candidates.push(PathBuf::from("/usr/local/bin/adb"));
        candidates.push(PathBuf::from("/usr/lib/android-sdk/platform-tools/adb"));
    }
    candidates
}

/// Parse `adb devices` output: a header line, then `<serial>\t<state>`.
pub fn parse_devices(output: &str) -> Vec<AttachedDevice> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(AttachedDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

pub async fn list_devices(gateway: &dyn Gateway) -> Result<Vec<AttachedDevice>, GatewayError> {
    let output = gateway.run_host(&["devices"]).await?;
    Ok(parse_devices(&output))
}

/// True if at least one attached device is authorized.
pub async fn is_device_connected(gateway: &dyn Gateway) -> bool {
    match list_devices(gateway).await {
        Ok(devices) => devices.iter().any(AttachedDevice::is_authorized),
        Err(err) => {
            debug!("[gateway] device listing failed: {err}");
            false
        }
    }
}

pub async fn device_info(gateway: &dyn Gateway) -> DeviceInfo {
    DeviceInfo {
        model: read_prop(gateway, "ro.product.model").await,
        android_version: read_prop(gateway, "ro.build.version.release").await,
    }
}

async fn read_prop(gateway: &dyn Gateway, prop: &str) -> String {
    match gateway.run_device(&format!("getprop {prop}")).await {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        Ok(_) => DeviceInfo::UNKNOWN.to_string(),
        Err(err) => {
            debug!("[gateway] getprop {prop} failed: {err}");
            DeviceInfo::UNKNOWN.to_string()
        }
    }
}
