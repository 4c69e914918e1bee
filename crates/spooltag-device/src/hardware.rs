//! Hardware reader/programmer driven through the Proxmark3 `pm3` client.
//!
//! Each operation shells out to `pm3 -c "<command>" [-p <device>]` and
//! parses its text output. There is no persistent connection: "connected"
//! means the last `hw status` probe answered, and the probe is re-run on
//! `connect()`. Commands that outlive their timeout are killed.

use crate::command::{
    CommandRecord, format_block_data, indicates_proxmark, indicates_tag_present, parse_block_data,
};
use crate::error::{DeviceError, Result};
use crate::traits::ProgrammerDevice;
use spooltag_core::config::EngineConfig;
use spooltag_core::constants::{BLOCK_SIZE, CANDIDATE_DEVICE_PATHS, is_data_block};
use spooltag_core::types::AuthKey;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a single `pm3` invocation.
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    output: String,
    error: String,
}

impl CommandOutput {
    fn combined_lower(&self) -> String {
        format!("{}\n{}", self.output, self.error).to_lowercase()
    }
}

/// Proxmark3-backed implementation of [`ProgrammerDevice`].
#[derive(Debug, Clone)]
pub struct ProxmarkProgrammer {
    /// Configured device path; `None` or `"auto"` triggers auto-detection.
    configured_path: Option<String>,

    /// Path that answered the last successful probe.
    resolved_path: Option<String>,

    /// Name of the Proxmark3 client binary.
    client_binary: String,

    connect_timeout: Duration,
    poll_timeout: Duration,
    command_timeout: Duration,

    connected: bool,
    log: Vec<CommandRecord>,
}

impl ProxmarkProgrammer {
    /// Build a programmer from engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        let configured_path = config
            .device_path
            .as_deref()
            .filter(|p| !p.is_empty() && *p != "auto")
            .map(str::to_owned);

        Self {
            configured_path,
            resolved_path: None,
            client_binary: "pm3".to_string(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            connected: false,
            log: Vec::new(),
        }
    }

    /// Override the client binary name (used by tests).
    #[cfg(test)]
    pub(crate) fn with_client_binary(mut self, binary: impl Into<String>) -> Self {
        self.client_binary = binary.into();
        self
    }

    /// Device path that answered the last probe, if any.
    pub fn resolved_path(&self) -> Option<&str> {
        self.resolved_path.as_deref()
    }

    /// Firmware banner from the last `hw status` probe, for status display.
    pub async fn firmware_info(&mut self) -> Result<String> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        let out = self.run_command("hw status", self.connect_timeout).await?;
        Ok(out.output)
    }

    /// Run one `pm3` command, enforcing `timeout` and recording the
    /// outcome in the command log.
    async fn run_command(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let started = Instant::now();

        let mut cmd = tokio::process::Command::new(&self.client_binary);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &self.resolved_path {
            cmd.arg("-p").arg(path);
        }

        let child = cmd.spawn().map_err(|e| {
            self.log.push(CommandRecord::new(
                command,
                false,
                "",
                e.to_string(),
                started.elapsed().as_millis() as u64,
            ));
            DeviceError::Io(e)
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let out = CommandOutput {
                    success: output.status.success(),
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                    error: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                let duration_ms = started.elapsed().as_millis() as u64;
                debug!(command, success = out.success, duration_ms, "pm3 command");
                self.log.push(CommandRecord::new(
                    command,
                    out.success,
                    out.output.clone(),
                    out.error.clone(),
                    duration_ms,
                ));
                Ok(out)
            }
            Ok(Err(e)) => {
                self.log.push(CommandRecord::new(
                    command,
                    false,
                    "",
                    e.to_string(),
                    started.elapsed().as_millis() as u64,
                ));
                Err(DeviceError::Io(e))
            }
            Err(_) => {
                // Dropping the handle kills the child (kill_on_drop).
                let duration_ms = timeout.as_millis() as u64;
                warn!(command, duration_ms, "pm3 command timed out");
                self.log.push(CommandRecord::new(
                    command,
                    false,
                    "",
                    format!("timeout after {duration_ms}ms"),
                    duration_ms,
                ));
                Err(DeviceError::timeout(duration_ms))
            }
        }
    }

    /// Candidate paths to probe, in order.
    fn candidate_paths(&self) -> Vec<String> {
        match &self.configured_path {
            Some(path) => vec![path.clone()],
            None => CANDIDATE_DEVICE_PATHS
                .iter()
                .filter(|p| Path::new(p).exists())
                .map(|p| (*p).to_string())
                .collect(),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }
}

impl ProgrammerDevice for ProxmarkProgrammer {
    async fn connect(&mut self) -> Result<()> {
        let candidates = self.candidate_paths();
        if candidates.is_empty() {
            return Err(DeviceError::unavailable("no serial device present"));
        }

        for path in candidates {
            self.resolved_path = Some(path.clone());
            match self.run_command("hw status", self.connect_timeout).await {
                Ok(out) if out.success && indicates_proxmark(&out.output) => {
                    info!(path, "Proxmark3 detected");
                    self.connected = true;
                    return Ok(());
                }
                Ok(_) => debug!(path, "no Proxmark3 answer on candidate path"),
                Err(e) => debug!(path, error = %e, "probe failed on candidate path"),
            }
        }

        self.resolved_path = None;
        self.connected = false;
        Err(DeviceError::unavailable(
            self.configured_path
                .clone()
                .unwrap_or_else(|| "auto".to_string()),
        ))
    }

    async fn is_tag_present(&mut self) -> Result<bool> {
        self.ensure_connected()?;
        let out = self.run_command("hf 14a info", self.poll_timeout).await?;
        Ok(out.success && indicates_tag_present(&out.output))
    }

    async fn write_block(
        &mut self,
        block: u8,
        data: &[u8; BLOCK_SIZE],
        key: &AuthKey,
    ) -> Result<()> {
        self.ensure_connected()?;
        if !is_data_block(block) {
            return Err(DeviceError::InvalidBlock { block });
        }

        let command = format!("hf mf wrbl {} A {} {}", block, key, format_block_data(data));
        let out = self.run_command(&command, self.command_timeout).await?;

        if out.success {
            return Ok(());
        }
        if out.combined_lower().contains("auth") {
            Err(DeviceError::authentication_failed(block))
        } else {
            Err(DeviceError::write_failed(block, out.error))
        }
    }

    async fn read_block(&mut self, block: u8, key: &AuthKey) -> Result<[u8; BLOCK_SIZE]> {
        self.ensure_connected()?;
        if !is_data_block(block) {
            return Err(DeviceError::InvalidBlock { block });
        }

        let command = format!("hf mf rdbl {} A {}", block, key);
        let out = self.run_command(&command, self.command_timeout).await?;

        if !out.success {
            if out.combined_lower().contains("auth") {
                return Err(DeviceError::authentication_failed(block));
            }
            return Err(DeviceError::read_failed(block, out.error));
        }

        parse_block_data(&out.output)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            debug!(path = ?self.resolved_path, "releasing programmer");
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn take_command_log(&mut self) -> Vec<CommandRecord> {
        std::mem::take(&mut self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EngineConfig {
        EngineConfig {
            connect_timeout_ms: 500,
            poll_timeout_ms: 500,
            command_timeout_ms: 500,
            ..Default::default()
        }
    }

    #[test]
    fn test_configured_path_auto_means_none() {
        let config = EngineConfig {
            device_path: Some("auto".to_string()),
            ..test_config()
        };
        let device = ProxmarkProgrammer::new(&config);
        assert!(device.configured_path.is_none());
    }

    #[test]
    fn test_explicit_path_is_single_candidate() {
        let config = EngineConfig {
            device_path: Some("/dev/ttyACM7".to_string()),
            ..test_config()
        };
        let device = ProxmarkProgrammer::new(&config);
        assert_eq!(device.candidate_paths(), vec!["/dev/ttyACM7".to_string()]);
    }

    #[tokio::test]
    async fn test_operations_require_connect() {
        let mut device = ProxmarkProgrammer::new(&test_config());
        let key = AuthKey::new("FFFFFFFFFFFF").unwrap();

        assert!(matches!(
            device.is_tag_present().await,
            Err(DeviceError::NotConnected)
        ));
        assert!(matches!(
            device.read_block(4, &key).await,
            Err(DeviceError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_without_client_binary() {
        let config = EngineConfig {
            device_path: Some("/dev/null".to_string()),
            ..test_config()
        };
        let mut device =
            ProxmarkProgrammer::new(&config).with_client_binary("pm3-does-not-exist-anywhere");

        let result = device.connect().await;
        assert!(result.is_err());
        assert!(!device.is_connected());

        // The failed probe is still recorded for audit.
        let log = device.take_command_log();
        assert_eq!(log.len(), 1);
        assert!(!log[0].success);
    }
}
