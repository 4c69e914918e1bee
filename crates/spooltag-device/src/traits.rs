//! Reader/programmer capability trait.
//!
//! The engine drives the physical reader/programmer through this narrow
//! surface. There are exactly two implementations — the hardware variant
//! talking to a Proxmark3 through the `pm3` client, and a mock for tests —
//! and the active one is chosen once at construction via
//! [`AnyProgrammerDevice`](crate::devices::AnyProgrammerDevice), never per
//! call.
//!
//! All methods are native `async fn` (Edition 2024 RPITIT), so the trait
//! is not object-safe; use generic parameters or the enum wrapper for
//! dispatch.

#![allow(async_fn_in_trait)]

use crate::command::CommandRecord;
use crate::error::Result;
use spooltag_core::constants::BLOCK_SIZE;
use spooltag_core::types::AuthKey;

/// Capability surface of the tag reader/programmer.
///
/// # Contracts
///
/// - Every operation fails fast with a typed [`DeviceError`]; nothing here
///   retries. Retrying is the engine's retry policy's job.
/// - `write_block` and `read_block` take a single key. Iterating a
///   candidate key list (first successful key wins) is done by the caller,
///   which declares authentication failed only after exhausting the list.
/// - Each command appends a [`CommandRecord`] to an internal buffer that
///   the caller drains with [`take_command_log`]; the device persists
///   nothing itself.
///
/// [`DeviceError`]: crate::error::DeviceError
/// [`take_command_log`]: ProgrammerDevice::take_command_log
pub trait ProgrammerDevice: Send + Sync {
    /// Establish the logical connection to the device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unavailable` if the configured device path
    /// does not respond within the connect timeout.
    async fn connect(&mut self) -> Result<()>;

    /// Check whether a tag is currently in the antenna field.
    ///
    /// A single reading is noisy immediately after placement or removal;
    /// callers are expected to debounce.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not connected or the poll command
    /// fails outright.
    async fn is_tag_present(&mut self) -> Result<bool>;

    /// Write one 16-byte block using the given authentication key.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::AuthenticationFailed` if the key is rejected,
    /// `DeviceError::InvalidBlock` for non-data blocks, or
    /// `DeviceError::WriteFailed` for any other rejection.
    async fn write_block(&mut self, block: u8, data: &[u8; BLOCK_SIZE], key: &AuthKey)
    -> Result<()>;

    /// Read one 16-byte block using the given authentication key.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::AuthenticationFailed` if the key is rejected,
    /// `DeviceError::InvalidBlock` for non-data blocks, or
    /// `DeviceError::ReadFailed`/`DeviceError::Parse` when the device
    /// output cannot be used.
    async fn read_block(&mut self, block: u8, key: &AuthKey) -> Result<[u8; BLOCK_SIZE]>;

    /// Release the logical connection.
    ///
    /// Safe to call when already disconnected.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether the last connect succeeded and no disconnect followed.
    fn is_connected(&self) -> bool;

    /// Drain the buffered command records for audit forwarding.
    fn take_command_log(&mut self) -> Vec<CommandRecord>;
}
