//! Error types for reader/programmer operations.
//!
//! All device operations fail fast with one of these variants; nothing in
//! this crate retries internally. Retry decisions belong to the engine's
//! retry policy.

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur while driving the reader/programmer.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The configured device did not respond to the connect-time probe.
    #[error("Device unavailable: {device}")]
    Unavailable { device: String },

    /// An operation was attempted before `connect()` succeeded.
    #[error("Device not connected")]
    NotConnected,

    /// A command did not complete within its timeout.
    #[error("Command timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// No configured key authenticated the block.
    #[error("Authentication failed for block {block}")]
    AuthenticationFailed { block: u8 },

    /// A block write was rejected by the device.
    #[error("Write failed for block {block}: {message}")]
    WriteFailed { block: u8, message: String },

    /// A block read was rejected by the device.
    #[error("Read failed for block {block}: {message}")]
    ReadFailed { block: u8, message: String },

    /// The block index is outside the writable payload area.
    #[error("Block {block} is not a writable data block")]
    InvalidBlock { block: u8 },

    /// The device returned output that could not be parsed.
    #[error("Unparseable device response: {message}")]
    Parse { message: String },

    /// Generic I/O error (spawning or talking to the `pm3` process).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Create a new unavailable error.
    pub fn unavailable(device: impl Into<String>) -> Self {
        Self::Unavailable {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new authentication failure for a block.
    pub fn authentication_failed(block: u8) -> Self {
        Self::AuthenticationFailed { block }
    }

    /// Create a new write failure.
    pub fn write_failed(block: u8, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            block,
            message: message.into(),
        }
    }

    /// Create a new read failure.
    pub fn read_failed(block: u8, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            block,
            message: message.into(),
        }
    }

    /// Create a new parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Whether this error means the device itself is gone (fatal for the
    /// whole session rather than a single attempt).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_error() {
        let error = DeviceError::unavailable("/dev/ttyACM0");
        assert!(error.is_unavailable());
        assert_eq!(error.to_string(), "Device unavailable: /dev/ttyACM0");
    }

    #[test]
    fn test_timeout_error() {
        let error = DeviceError::timeout(3000);
        assert!(!error.is_unavailable());
        assert_eq!(error.to_string(), "Command timeout after 3000ms");
    }

    #[test]
    fn test_authentication_failed_display() {
        let error = DeviceError::authentication_failed(12);
        assert_eq!(error.to_string(), "Authentication failed for block 12");
    }

    #[test]
    fn test_write_failed_display() {
        let error = DeviceError::write_failed(4, "tag removed");
        assert_eq!(error.to_string(), "Write failed for block 4: tag removed");
    }
}
