//! Block writing with candidate-key iteration.
//!
//! The device trait takes a single key per operation; this module owns the
//! key-ring behavior: every configured key is tried in order, the first
//! one that authenticates wins, and `AuthenticationFailed` is only
//! declared after the whole list is exhausted.

use crate::payload::TagPayload;
use spooltag_core::constants::{BLOCK_SIZE, data_blocks};
use spooltag_core::types::AuthKey;
use spooltag_device::{DeviceError, ProgrammerDevice};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Failure of a multi-block device operation.
#[derive(Debug, thiserror::Error)]
pub enum BlockIoError {
    /// A stop request interrupted the operation between blocks.
    #[error("operation cancelled by stop request")]
    Cancelled,

    /// The device rejected a block.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Write one block, trying each candidate key in order.
///
/// # Errors
/// `DeviceError::AuthenticationFailed` once every key has been rejected;
/// any other device error is returned immediately.
pub async fn write_block_any_key<D: ProgrammerDevice>(
    device: &mut D,
    block: u8,
    data: &[u8; BLOCK_SIZE],
    keys: &[AuthKey],
) -> Result<(), DeviceError> {
    for key in keys {
        match device.write_block(block, data, key).await {
            Ok(()) => return Ok(()),
            Err(DeviceError::AuthenticationFailed { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(DeviceError::authentication_failed(block))
}

/// Read one block, trying each candidate key in order.
///
/// # Errors
/// `DeviceError::AuthenticationFailed` once every key has been rejected;
/// any other device error is returned immediately.
pub async fn read_block_any_key<D: ProgrammerDevice>(
    device: &mut D,
    block: u8,
    keys: &[AuthKey],
) -> Result<[u8; BLOCK_SIZE], DeviceError> {
    for key in keys {
        match device.read_block(block, key).await {
            Ok(data) => return Ok(data),
            Err(DeviceError::AuthenticationFailed { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(DeviceError::authentication_failed(block))
}

/// Write the full payload to every data block of the tag.
///
/// The manufacturer block and sector trailers are skipped; each data
/// block receives the payload bytes at its fixed offset. The cancellation
/// token is checked between blocks so an in-flight block write always
/// completes before a stop takes effect.
///
/// # Errors
/// `BlockIoError::Cancelled` on stop, `BlockIoError::Device` on the first
/// rejected block.
pub async fn write_payload<D: ProgrammerDevice>(
    device: &mut D,
    payload: &TagPayload,
    keys: &[AuthKey],
    cancel: &CancellationToken,
) -> Result<(), BlockIoError> {
    for block in data_blocks() {
        if cancel.is_cancelled() {
            return Err(BlockIoError::Cancelled);
        }
        let data = payload.block(block);
        write_block_any_key(device, block, &data, keys).await?;
    }
    debug!("payload written to all data blocks");
    Ok(())
}
