use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::GatewayError;
use crate::gateway::Gateway;

#[derive(Default)]
pub struct FakeGateway {
    host: HashMap<String, String>,
    device: HashMap<String, Result<String, String>>,
    calls: Mutex<Vec<(String, Duration)>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, command_line: &str, stdout: &str) -> Self {
        self.device
            .insert(command_line.to_string(), Ok(stdout.to_string()));
        self
    }

    pub fn failing(mut self, command_line: &str, stderr: &str) -> Self {
        self.device
            .insert(command_line.to_string(), Err(stderr.to_string()));
        self
    }

    pub fn with_host(mut self, args: &str, stdout: &str) -> Self {
        self.host.insert(args.to_string(), stdout.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Duration)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn run_host(&self, args: &[&str]) -> Result<String, GatewayError> {
        let key = args.join(" ");
        self.host
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::CommandFailed {
                command: format!("adb {key}"),
                status: 1,
                stderr: "error: no devices/emulators found".to_string(),
            })
    }

    async fn run_device_with_timeout(
        &self,
        command_line: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push((command_line.to_string(), timeout));
        match self.device.get(command_line) {
            Some(Ok(stdout)) => Ok(stdout.clone()),
            Some(Err(stderr)) => Err(GatewayError::CommandFailed {
                command: format!("adb shell {command_line}"),
                status: 1,
                stderr: stderr.clone(),
            }),
            None => Err(GatewayError::CommandFailed {
                command: format!("adb shell {command_line}"),
                status: 127,
                stderr: format!("/system/bin/sh: {command_line}: inaccessible or not found"),
            }),
        }
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}
