//! Post-write verification.
//!
//! In strict mode every written data block is read back and byte-compared
//! against the intended payload; the first mismatch (or any read failure)
//! fails verification. On success the engine's only artifact beyond
//! pass/fail is produced here: the SHA-256 digest of the full 1024-byte
//! payload, recorded for audit. In tolerant mode verification is skipped
//! entirely and no digest is recorded.

use crate::payload::TagPayload;
use crate::writer::read_block_any_key;
use sha2::{Digest, Sha256};
use spooltag_core::config::VerificationMode;
use spooltag_core::constants::{BLOCK_SIZE, TAG_CAPACITY, data_blocks};
use spooltag_core::types::AuthKey;
use spooltag_device::{DeviceError, ProgrammerDevice};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors produced by a strict verification pass.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A read-back block differed from the intended payload.
    #[error("block {block} read back different data")]
    Mismatch { block: u8 },

    /// A block could not be read back.
    #[error("read-back failed: {0}")]
    Read(#[from] DeviceError),

    /// A stop request interrupted verification.
    #[error("verification cancelled by stop request")]
    Cancelled,
}

/// SHA-256 hex digest of a payload image.
///
/// # Examples
///
/// ```
/// use spooltag_engine::payload::TagPayload;
/// use spooltag_engine::verify::content_hash;
///
/// let payload = TagPayload::from_bytes(&[0u8; 1024]).unwrap();
/// assert_eq!(content_hash(&payload).len(), 64);
/// ```
pub fn content_hash(payload: &TagPayload) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compare a full read-back image against the payload, returning the
/// first data block that differs.
///
/// Only payload-carrying blocks are compared; the manufacturer block and
/// sector trailers are ignored. `image` must be a full 1024-byte dump.
pub fn first_mismatch(expected: &TagPayload, image: &[u8; TAG_CAPACITY]) -> Option<u8> {
    data_blocks().find(|block| {
        let offset = *block as usize * BLOCK_SIZE;
        image[offset..offset + BLOCK_SIZE] != expected.block(*block)
    })
}

/// Verification engine applying the session-wide policy.
#[derive(Debug, Clone)]
pub struct Verifier {
    mode: VerificationMode,
}

impl Verifier {
    /// Create a verifier for the given policy.
    pub fn new(mode: VerificationMode) -> Self {
        Self { mode }
    }

    /// The active policy.
    #[must_use]
    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    /// Whether a read-back pass runs after writing.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.mode == VerificationMode::Strict
    }

    /// Read back every data block and byte-compare against `payload`.
    ///
    /// Only meaningful in strict mode; callers skip this entirely under
    /// the tolerant policy. Returns the payload's content hash on success.
    ///
    /// # Errors
    /// `VerifyError::Mismatch` on the first differing block,
    /// `VerifyError::Read` if a block cannot be read back,
    /// `VerifyError::Cancelled` on stop.
    pub async fn verify<D: ProgrammerDevice>(
        &self,
        device: &mut D,
        payload: &TagPayload,
        keys: &[AuthKey],
        cancel: &CancellationToken,
    ) -> Result<String, VerifyError> {
        for block in data_blocks() {
            if cancel.is_cancelled() {
                return Err(VerifyError::Cancelled);
            }
            let read = read_block_any_key(device, block, keys).await?;
            if read != payload.block(block) {
                return Err(VerifyError::Mismatch { block });
            }
        }

        let hash = content_hash(payload);
        debug!(%hash, "verification passed");
        Ok(hash)
    }
}
