//! Engine configuration.
//!
//! All operational tuning values live here so that deployments can adjust
//! them without rebuilding: retry limits, verification policy, detection
//! cadence and the candidate key list are all data, not code. The file
//! format is JSON, matching the rest of the on-disk surface (catalog,
//! snapshots, audit records).

use crate::{
    Result,
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DEBOUNCE_POLLS,
        DEFAULT_DETECTION_INTERVAL_MS, DEFAULT_INTER_ATTEMPT_DELAY_MS, DEFAULT_KEYS,
        DEFAULT_POLL_TIMEOUT_MS, DEFAULT_PRESENCE_TIMEOUT_MS, DEFAULT_REMOVAL_TIMEOUT_MS,
        DEFAULT_RETRY_LIMIT,
    },
    error::Error,
    types::AuthKey,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Verification policy applied after writing a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Read back every written block and byte-compare against the payload.
    Strict,

    /// Skip verification entirely; a completed write counts as a pass.
    Tolerant,
}

impl Default for VerificationMode {
    fn default() -> Self {
        Self::Strict
    }
}

impl std::fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Tolerant => write!(f, "tolerant"),
        }
    }
}

/// Configuration for the programming engine.
///
/// Every field has a default, so an empty JSON object (`{}`) is a valid
/// configuration file.
///
/// # Examples
///
/// ```
/// use spooltag_core::config::{EngineConfig, VerificationMode};
///
/// let config = EngineConfig::default();
/// assert_eq!(config.retry_limit, 3);
/// assert_eq!(config.verification, VerificationMode::Strict);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Serial path of the reader/programmer. `None` means auto-detect.
    pub device_path: Option<String>,

    /// Use the mock device instead of real hardware.
    pub mock_mode: bool,

    /// Detect/write/verify attempts allowed per tag (>= 1).
    pub retry_limit: u32,

    /// Post-write verification policy.
    pub verification: VerificationMode,

    /// Interval between presence polls, in milliseconds.
    pub detection_interval_ms: u64,

    /// Consecutive agreeing polls required before trusting a reading (>= 2).
    pub debounce_polls: u32,

    /// Time allowed for the operator to place a tag, in milliseconds.
    pub presence_timeout_ms: u64,

    /// Time allowed for the operator to remove a tag, in milliseconds.
    pub removal_timeout_ms: u64,

    /// Timeout for short device commands (presence polls), in milliseconds.
    pub poll_timeout_ms: u64,

    /// Timeout for block read/write commands, in milliseconds.
    pub command_timeout_ms: u64,

    /// Timeout for the connect-time device probe, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Delay between attempts of the same tag, in milliseconds.
    pub inter_attempt_delay_ms: u64,

    /// Candidate authentication keys, tried in order.
    pub default_keys: Vec<AuthKey>,

    /// Directory holding per-SKU payload files.
    pub binaries_dir: PathBuf,

    /// Optional filament catalog file (SKU metadata and key overrides).
    pub catalog_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_path: None,
            mock_mode: false,
            retry_limit: DEFAULT_RETRY_LIMIT,
            verification: VerificationMode::default(),
            detection_interval_ms: DEFAULT_DETECTION_INTERVAL_MS,
            debounce_polls: DEFAULT_DEBOUNCE_POLLS,
            presence_timeout_ms: DEFAULT_PRESENCE_TIMEOUT_MS,
            removal_timeout_ms: DEFAULT_REMOVAL_TIMEOUT_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            inter_attempt_delay_ms: DEFAULT_INTER_ATTEMPT_DELAY_MS,
            default_keys: DEFAULT_KEYS
                .iter()
                .map(|k| AuthKey::new(k).expect("default keys are valid"))
                .collect(),
            binaries_dir: PathBuf::from("/opt/spooltag/binaries"),
            catalog_file: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, `Error::Json` if it
    /// is not valid JSON, or `Error::Config` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check all values are within their allowed ranges.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.retry_limit < 1 {
            return Err(Error::Config("retry_limit must be >= 1".into()));
        }
        if self.debounce_polls < 2 {
            return Err(Error::Config("debounce_polls must be >= 2".into()));
        }
        if self.detection_interval_ms == 0 {
            return Err(Error::Config("detection_interval_ms must be > 0".into()));
        }
        if self.default_keys.is_empty() {
            return Err(Error::Config(
                "at least one authentication key is required".into(),
            ));
        }
        Ok(())
    }

    /// Detection poll interval as a [`Duration`].
    #[must_use]
    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    /// Presence wait timeout as a [`Duration`].
    #[must_use]
    pub fn presence_timeout(&self) -> Duration {
        Duration::from_millis(self.presence_timeout_ms)
    }

    /// Removal wait timeout as a [`Duration`].
    #[must_use]
    pub fn removal_timeout(&self) -> Duration {
        Duration::from_millis(self.removal_timeout_ms)
    }

    /// Inter-attempt delay as a [`Duration`].
    #[must_use]
    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.inter_attempt_delay_ms)
    }
}
