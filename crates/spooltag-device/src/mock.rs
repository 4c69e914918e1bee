//! Mock reader/programmer for testing and development.
//!
//! The mock simulates the observable behavior of the hardware variant:
//! per-command latency, tag placement and removal, key authentication,
//! and a block store that reads back exactly what was written (so strict
//! verification round-trips). A [`MockProgrammerHandle`] shares the same
//! state and lets tests choreograph the operator: place and remove tags,
//! inject write failures or read corruption, or make the device vanish.

use crate::command::CommandRecord;
use crate::error::{DeviceError, Result};
use crate::traits::ProgrammerDevice;
use spooltag_core::constants::{BLOCK_SIZE, TAG_CAPACITY, is_data_block};
use spooltag_core::types::AuthKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct MockState {
    present: bool,
    unavailable: bool,
    accepted_keys: Vec<AuthKey>,
    blocks: HashMap<u8, [u8; BLOCK_SIZE]>,
    fail_writes_remaining: u32,
    corrupt_reads_remaining: u32,
    latency: Duration,
}

impl MockState {
    fn accepts(&self, key: &AuthKey) -> bool {
        self.accepted_keys.iter().any(|k| k == key)
    }
}

/// Mock implementation of [`ProgrammerDevice`].
///
/// Created together with its control handle:
///
/// ```
/// use spooltag_device::mock::MockProgrammer;
/// use spooltag_device::ProgrammerDevice;
/// use spooltag_core::types::AuthKey;
///
/// #[tokio::main]
/// async fn main() -> spooltag_device::Result<()> {
///     let (mut device, handle) = MockProgrammer::new();
///     handle.set_latency(std::time::Duration::ZERO);
///
///     device.connect().await?;
///     handle.place_tag();
///     assert!(device.is_tag_present().await?);
///
///     let key = AuthKey::new("FFFFFFFFFFFF").unwrap();
///     device.write_block(4, &[0x42; 16], &key).await?;
///     assert_eq!(device.read_block(4, &key).await?, [0x42; 16]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockProgrammer {
    state: Arc<Mutex<MockState>>,
    connected: bool,
    log: Vec<CommandRecord>,
}

impl MockProgrammer {
    /// Create a mock programmer and its control handle.
    ///
    /// Defaults: no tag in the field, the factory key `FFFFFFFFFFFF`
    /// accepted, 20 ms simulated latency per command.
    pub fn new() -> (Self, MockProgrammerHandle) {
        let state = Arc::new(Mutex::new(MockState {
            present: false,
            unavailable: false,
            accepted_keys: vec![AuthKey::new("FFFFFFFFFFFF").expect("valid key")],
            blocks: HashMap::new(),
            fail_writes_remaining: 0,
            corrupt_reads_remaining: 0,
            latency: Duration::from_millis(20),
        }));

        let device = Self {
            state: Arc::clone(&state),
            connected: false,
            log: Vec::new(),
        };
        let handle = MockProgrammerHandle { state };

        (device, handle)
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().expect("mock state poisoned").latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn record(&mut self, command: impl Into<String>, success: bool, output: impl Into<String>) {
        self.log
            .push(CommandRecord::new(command, success, output, "", 0));
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    /// Default content of a block that was never written (block index
    /// repeated, mirroring an unprogrammed test tag).
    fn default_block(block: u8) -> [u8; BLOCK_SIZE] {
        [block; BLOCK_SIZE]
    }
}

impl ProgrammerDevice for MockProgrammer {
    async fn connect(&mut self) -> Result<()> {
        self.simulate_latency().await;
        let unavailable = self.state.lock().expect("mock state poisoned").unavailable;
        if unavailable {
            self.record("hw status", false, "");
            return Err(DeviceError::unavailable("mock programmer"));
        }
        self.connected = true;
        self.record("hw status", true, "Proxmark3 RFID instrument (mock)");
        Ok(())
    }

    async fn is_tag_present(&mut self) -> Result<bool> {
        self.ensure_connected()?;
        self.simulate_latency().await;
        let present = self.state.lock().expect("mock state poisoned").present;
        self.record(
            "hf 14a info",
            true,
            if present {
                "UID: 12 34 56 78\nType: MIFARE Classic 1K"
            } else {
                ""
            },
        );
        Ok(present)
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
        self.simulate_latency().await;

        let command = format!("hf mf wrbl {} A {} <data>", block, key);
        let mut state = self.state.lock().expect("mock state poisoned");

        if !state.present {
            drop(state);
            self.record(&command, false, "no tag in field");
            return Err(DeviceError::write_failed(block, "no tag in field"));
        }
        if !state.accepts(key) {
            drop(state);
            self.record(&command, false, "auth error");
            return Err(DeviceError::authentication_failed(block));
        }
        if state.fail_writes_remaining > 0 {
            state.fail_writes_remaining -= 1;
            drop(state);
            self.record(&command, false, "write error");
            return Err(DeviceError::write_failed(block, "simulated write failure"));
        }

        state.blocks.insert(block, *data);
        drop(state);
        self.record(&command, true, "Block written successfully");
        Ok(())
    }

    async fn read_block(&mut self, block: u8, key: &AuthKey) -> Result<[u8; BLOCK_SIZE]> {
        self.ensure_connected()?;
        if !is_data_block(block) {
            return Err(DeviceError::InvalidBlock { block });
        }
        self.simulate_latency().await;

        let command = format!("hf mf rdbl {} A {}", block, key);
        let mut state = self.state.lock().expect("mock state poisoned");

        if !state.present {
            drop(state);
            self.record(&command, false, "no tag in field");
            return Err(DeviceError::read_failed(block, "no tag in field"));
        }
        if !state.accepts(key) {
            drop(state);
            self.record(&command, false, "auth error");
            return Err(DeviceError::authentication_failed(block));
        }

        let mut data = state
            .blocks
            .get(&block)
            .copied()
            .unwrap_or_else(|| Self::default_block(block));

        if state.corrupt_reads_remaining > 0 {
            state.corrupt_reads_remaining -= 1;
            data[BLOCK_SIZE - 1] ^= 0xFF;
        }
        drop(state);

        self.record(&command, true, "Block data: <hex>");
        Ok(data)
    }

    async fn disconnect(&mut self) -> Result<()> {
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

/// Control handle for a [`MockProgrammer`].
///
/// Shares state with the device (and all of its clones), so tests can
/// drive the simulated operator while the engine runs.
#[derive(Debug, Clone)]
pub struct MockProgrammerHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockProgrammerHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Place a tag on the simulated antenna.
    pub fn place_tag(&self) {
        self.lock().present = true;
    }

    /// Remove the tag from the simulated antenna.
    ///
    /// Written blocks are kept, so re-placing simulates the same physical
    /// tag coming back.
    pub fn remove_tag(&self) {
        self.lock().present = false;
    }

    /// Clear all written blocks, simulating a fresh tag.
    pub fn clear_tag(&self) {
        self.lock().blocks.clear();
    }

    /// Whether a tag is currently placed.
    pub fn is_tag_placed(&self) -> bool {
        self.lock().present
    }

    /// Make `connect()` fail with `DeviceError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Replace the set of keys the simulated tag accepts.
    pub fn set_accepted_keys(&self, keys: Vec<AuthKey>) {
        self.lock().accepted_keys = keys;
    }

    /// Fail the next `n` block writes.
    pub fn fail_next_writes(&self, n: u32) {
        self.lock().fail_writes_remaining = n;
    }

    /// Corrupt the next `n` block reads (one byte flipped each).
    pub fn corrupt_next_reads(&self, n: u32) {
        self.lock().corrupt_reads_remaining = n;
    }

    /// Set the simulated per-command latency.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Content of a written block, if any.
    pub fn written_block(&self, block: u8) -> Option<[u8; BLOCK_SIZE]> {
        self.lock().blocks.get(&block).copied()
    }

    /// Number of blocks written so far.
    pub fn written_block_count(&self) -> usize {
        self.lock().blocks.len()
    }

    /// Assemble the full 1024-byte image as currently written; unwritten
    /// blocks read as zero.
    pub fn written_image(&self) -> Vec<u8> {
        let state = self.lock();
        let mut image = vec![0u8; TAG_CAPACITY];
        for (block, data) in &state.blocks {
            let offset = *block as usize * BLOCK_SIZE;
            image[offset..offset + BLOCK_SIZE].copy_from_slice(data);
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_mock() -> (MockProgrammer, MockProgrammerHandle) {
        let (device, handle) = MockProgrammer::new();
        handle.set_latency(Duration::ZERO);
        (device, handle)
    }

    fn factory_key() -> AuthKey {
        AuthKey::new("FFFFFFFFFFFF").unwrap()
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();
        handle.place_tag();

        let data = [0xAB; BLOCK_SIZE];
        device.write_block(4, &data, &factory_key()).await.unwrap();
        let read = device.read_block(4, &factory_key()).await.unwrap();
        assert_eq!(read, data);
        assert_eq!(handle.written_block(4), Some(data));
    }

    #[tokio::test]
    async fn test_presence_follows_handle() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();

        assert!(!device.is_tag_present().await.unwrap());
        handle.place_tag();
        assert!(device.is_tag_present().await.unwrap());
        handle.remove_tag();
        assert!(!device.is_tag_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_fails_connect() {
        let (mut device, handle) = fast_mock();
        handle.set_unavailable(true);

        let result = device.connect().await;
        assert!(matches!(result, Err(DeviceError::Unavailable { .. })));
        assert!(!device.is_connected());
    }

    #[tokio::test]
    async fn test_wrong_key_is_authentication_failure() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();
        handle.place_tag();

        let wrong = AuthKey::new("000000000000").unwrap();
        let result = device.write_block(4, &[0; BLOCK_SIZE], &wrong).await;
        assert!(matches!(
            result,
            Err(DeviceError::AuthenticationFailed { block: 4 })
        ));
    }

    #[tokio::test]
    async fn test_write_without_tag_fails() {
        let (mut device, _handle) = fast_mock();
        device.connect().await.unwrap();

        let result = device.write_block(4, &[0; BLOCK_SIZE], &factory_key()).await;
        assert!(matches!(result, Err(DeviceError::WriteFailed { .. })));
    }

    #[tokio::test]
    async fn test_injected_write_failures_are_consumed() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();
        handle.place_tag();
        handle.fail_next_writes(1);

        let result = device.write_block(4, &[0; BLOCK_SIZE], &factory_key()).await;
        assert!(result.is_err());

        // Injection consumed; next write succeeds.
        let result = device.write_block(4, &[0; BLOCK_SIZE], &factory_key()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_corrupted_read_differs_from_written() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();
        handle.place_tag();

        let data = [0x11; BLOCK_SIZE];
        device.write_block(8, &data, &factory_key()).await.unwrap();

        handle.corrupt_next_reads(1);
        let corrupted = device.read_block(8, &factory_key()).await.unwrap();
        assert_ne!(corrupted, data);

        let clean = device.read_block(8, &factory_key()).await.unwrap();
        assert_eq!(clean, data);
    }

    #[tokio::test]
    async fn test_invalid_blocks_rejected() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();
        handle.place_tag();

        // Manufacturer block and a sector trailer.
        for block in [0u8, 3, 63] {
            let result = device.write_block(block, &[0; BLOCK_SIZE], &factory_key()).await;
            assert!(matches!(result, Err(DeviceError::InvalidBlock { .. })));
        }
    }

    #[tokio::test]
    async fn test_unwritten_block_has_default_pattern() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();
        handle.place_tag();

        let data = device.read_block(5, &factory_key()).await.unwrap();
        assert_eq!(data, [5u8; BLOCK_SIZE]);
    }

    #[tokio::test]
    async fn test_command_log_is_drained() {
        let (mut device, handle) = fast_mock();
        device.connect().await.unwrap();
        handle.place_tag();
        device.is_tag_present().await.unwrap();

        let log = device.take_command_log();
        assert_eq!(log.len(), 2);
        assert!(device.take_command_log().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_tag_state() {
        let (mut device, handle) = fast_mock();
        let mut clone = device.clone();

        device.connect().await.unwrap();
        clone.connect().await.unwrap();
        handle.place_tag();

        device.write_block(4, &[0x77; BLOCK_SIZE], &factory_key()).await.unwrap();
        let read = clone.read_block(4, &factory_key()).await.unwrap();
        assert_eq!(read, [0x77; BLOCK_SIZE]);
    }
}
