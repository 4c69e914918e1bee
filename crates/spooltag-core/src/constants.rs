//! Core constants for the spool tag programming engine.
//!
//! This module centralizes the MIFARE Classic 1K memory layout and the
//! default operational tuning values used throughout the workspace. The
//! layout constants describe how a 1024-byte spool payload maps onto the
//! tag's blocks; the tuning constants are defaults only and can be
//! overridden through [`EngineConfig`](crate::config::EngineConfig).
//!
//! # Memory Layout
//!
//! A MIFARE Classic 1K tag exposes 1024 bytes as 16 sectors of 4 blocks,
//! each block 16 bytes:
//!
//! ```text
//! sector 0:  block 0  (manufacturer data, read-only)
//!            block 1..2
//!            block 3  (sector trailer: keys + access bits)
//! sector 1:  block 4..6
//!            block 7  (sector trailer)
//! ...
//! sector 15: block 60..62
//!            block 63 (sector trailer)
//! ```
//!
//! The manufacturer block and the sector trailers are never written or
//! compared; only the remaining data blocks carry payload bytes, each at
//! its fixed offset `block * 16` within the payload image.

// ============================================================================
// MIFARE Classic 1K layout
// ============================================================================

/// Total tag capacity in bytes (and the exact size of every payload image).
pub const TAG_CAPACITY: usize = 1024;

/// Size of a single block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Number of blocks on the tag.
pub const BLOCK_COUNT: u8 = 64;

/// Number of sectors on the tag.
pub const SECTOR_COUNT: u8 = 16;

/// Blocks per sector.
pub const BLOCKS_PER_SECTOR: u8 = 4;

/// Block 0 holds manufacturer data and is never written.
pub const MANUFACTURER_BLOCK: u8 = 0;

/// Check whether a block index is a sector trailer.
///
/// Trailer blocks hold authentication keys and access bits; writing them
/// with payload data would brick the sector.
///
/// # Examples
///
/// ```
/// use spooltag_core::constants::is_trailer_block;
///
/// assert!(is_trailer_block(3));
/// assert!(is_trailer_block(63));
/// assert!(!is_trailer_block(4));
/// ```
pub const fn is_trailer_block(block: u8) -> bool {
    (block + 1) % BLOCKS_PER_SECTOR == 0
}

/// Check whether a block index carries payload data.
///
/// Data blocks are every block except the manufacturer block and the
/// sector trailers.
pub const fn is_data_block(block: u8) -> bool {
    block < BLOCK_COUNT && block != MANUFACTURER_BLOCK && !is_trailer_block(block)
}

/// Iterate over all payload-carrying block indices in ascending order.
///
/// # Examples
///
/// ```
/// use spooltag_core::constants::data_blocks;
///
/// let blocks: Vec<u8> = data_blocks().collect();
/// assert_eq!(blocks.len(), 47);
/// assert_eq!(blocks.first(), Some(&1));
/// assert_eq!(blocks.last(), Some(&62));
/// ```
pub fn data_blocks() -> impl Iterator<Item = u8> {
    (0..BLOCK_COUNT).filter(|b| is_data_block(*b))
}

// ============================================================================
// Authentication keys
// ============================================================================

/// Length of a MIFARE Classic key in hex characters (6 bytes).
pub const AUTH_KEY_LENGTH: usize = 12;

/// Factory-default candidate keys tried against unprogrammed tags.
pub const DEFAULT_KEYS: &[&str] = &["FFFFFFFFFFFF", "000000000000"];

// ============================================================================
// SKU format constraints
// ============================================================================

/// Minimum SKU length (characters).
pub const MIN_SKU_LENGTH: usize = 3;

/// Maximum SKU length (characters).
pub const MAX_SKU_LENGTH: usize = 32;

// ============================================================================
// Default tuning values
// ============================================================================

/// Default number of detect/write/verify attempts per tag.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default interval between presence polls (milliseconds).
pub const DEFAULT_DETECTION_INTERVAL_MS: u64 = 1000;

/// Minimum consecutive polls required before a presence/absence reading is
/// trusted. Raw antenna reads are noisy immediately after placement or
/// removal, so a single positive read is never acted on.
pub const DEFAULT_DEBOUNCE_POLLS: u32 = 2;

/// Default time allowed for the operator to place a tag (milliseconds).
pub const DEFAULT_PRESENCE_TIMEOUT_MS: u64 = 30_000;

/// Default time allowed for the operator to remove a tag (milliseconds).
pub const DEFAULT_REMOVAL_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for short device commands such as presence polls
/// (milliseconds).
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 3000;

/// Default timeout for block read/write commands (milliseconds).
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for the initial device probe at connect (milliseconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default delay inserted between attempts of the same tag (milliseconds).
pub const DEFAULT_INTER_ATTEMPT_DELAY_MS: u64 = 500;

/// Candidate serial device paths probed when no explicit path is
/// configured.
pub const CANDIDATE_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0",
    "/dev/ttyACM1",
    "/dev/ttyUSB0",
    "/dev/ttyUSB1",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_blocks() {
        for sector in 0..SECTOR_COUNT {
            let trailer = sector * BLOCKS_PER_SECTOR + (BLOCKS_PER_SECTOR - 1);
            assert!(is_trailer_block(trailer));
        }
        assert!(!is_trailer_block(0));
        assert!(!is_trailer_block(1));
        assert!(!is_trailer_block(62));
    }

    #[test]
    fn test_data_blocks_skip_manufacturer_and_trailers() {
        let blocks: Vec<u8> = data_blocks().collect();

        assert!(!blocks.contains(&MANUFACTURER_BLOCK));
        assert!(blocks.iter().all(|b| !is_trailer_block(*b)));

        // 64 blocks minus 16 trailers minus block 0
        assert_eq!(blocks.len(), 47);
    }

    #[test]
    fn test_data_block_offsets_fit_capacity() {
        for block in data_blocks() {
            let end = (block as usize + 1) * BLOCK_SIZE;
            assert!(end <= TAG_CAPACITY);
        }
    }

    #[test]
    fn test_layout_totals() {
        assert_eq!(BLOCK_COUNT as usize * BLOCK_SIZE, TAG_CAPACITY);
        assert_eq!(SECTOR_COUNT * BLOCKS_PER_SECTOR, BLOCK_COUNT);
    }
}
