//! Command records and Proxmark output parsing.
//!
//! Every operation a device performs is captured as a [`CommandRecord`] in
//! an in-memory buffer the caller drains and forwards; the device itself
//! never persists anything. The parsing helpers in this module are pure
//! functions over the text the `pm3` client prints, so they can be tested
//! without hardware.

use crate::error::{DeviceError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spooltag_core::constants::BLOCK_SIZE;

/// One device command and its raw outcome, for audit forwarding.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    /// The command string as sent to the device.
    pub command: String,

    /// Whether the device reported success.
    pub success: bool,

    /// Raw standard output of the command.
    pub output: String,

    /// Raw error output of the command.
    pub error: String,

    /// Wall-clock duration of the command in milliseconds.
    pub duration_ms: u64,

    /// When the command was issued.
    pub timestamp: DateTime<Utc>,
}

impl CommandRecord {
    /// Create a record for a command that just completed.
    pub fn new(
        command: impl Into<String>,
        success: bool,
        output: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            command: command.into(),
            success,
            output: output.into(),
            error: error.into(),
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}

/// Check whether `hf 14a info` output indicates a MIFARE Classic 1K tag
/// in the field.
///
/// # Examples
///
/// ```
/// use spooltag_device::command::indicates_tag_present;
///
/// let output = "UID: 12 34 56 78\nATQA: 00 04\nSAK: 08\nType: MIFARE Classic 1K";
/// assert!(indicates_tag_present(output));
/// assert!(!indicates_tag_present("searching for tags..."));
/// ```
pub fn indicates_tag_present(output: &str) -> bool {
    let output = output.to_lowercase();
    output.contains("mifare")
        && (output.contains("classic") || output.contains("1k"))
        && output.contains("uid:")
}

/// Check whether `hw status` output identifies a Proxmark3.
pub fn indicates_proxmark(output: &str) -> bool {
    output.contains("Proxmark3")
}

/// Format block bytes as the uppercase hex string `hf mf wrbl` expects.
pub fn format_block_data(data: &[u8; BLOCK_SIZE]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Extract 16 block bytes from `hf mf rdbl` output.
///
/// The client prints the block as a `Block data:` line of space-separated
/// hex pairs; anything else is a parse failure.
///
/// # Errors
/// Returns `DeviceError::Parse` if no block-data line is present or the
/// hex payload is not exactly 16 bytes.
pub fn parse_block_data(output: &str) -> Result<[u8; BLOCK_SIZE]> {
    for line in output.lines() {
        if !line.to_lowercase().contains("block data") {
            continue;
        }
        let hex_part = line.rsplit(':').next().unwrap_or("").trim();
        let hex: String = hex_part.chars().filter(|c| !c.is_whitespace()).collect();
        if !hex.is_ascii() {
            return Err(DeviceError::parse(format!(
                "non-hex block data line: {line}"
            )));
        }
        if hex.len() != BLOCK_SIZE * 2 {
            return Err(DeviceError::parse(format!(
                "block data line has {} hex chars, expected {}",
                hex.len(),
                BLOCK_SIZE * 2
            )));
        }
        return decode_hex_block(&hex);
    }

    Err(DeviceError::parse("no block data line in device output"))
}

fn decode_hex_block(hex: &str) -> Result<[u8; BLOCK_SIZE]> {
    let mut data = [0u8; BLOCK_SIZE];
    for (i, byte) in data.iter_mut().enumerate() {
        let pair = &hex[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|_| DeviceError::parse(format!("invalid hex byte: {pair}")))?;
    }
    Ok(data)
}
