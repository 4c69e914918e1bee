//! Enum wrapper for programmer device dispatch.
//!
//! Native `async fn` in traits (RPITIT) is not object-safe, so the two
//! [`ProgrammerDevice`] implementations cannot be boxed behind
//! `dyn ProgrammerDevice`. This enum provides concrete dispatch instead:
//! the variant is chosen once at construction from configuration, and the
//! engine stays oblivious to which one is active.

use crate::command::CommandRecord;
use crate::error::Result;
use crate::hardware::ProxmarkProgrammer;
use crate::mock::{MockProgrammer, MockProgrammerHandle};
use crate::traits::ProgrammerDevice;
use spooltag_core::config::EngineConfig;
use spooltag_core::constants::BLOCK_SIZE;
use spooltag_core::types::AuthKey;

/// Either the Proxmark3-backed hardware programmer or the mock.
#[derive(Debug, Clone)]
pub enum AnyProgrammerDevice {
    /// Physical reader/programmer driven through the `pm3` client.
    Hardware(ProxmarkProgrammer),

    /// Simulated programmer for tests and development.
    Mock(MockProgrammer),
}

impl AnyProgrammerDevice {
    /// Select and build the device variant from configuration.
    ///
    /// With `mock_mode` set, the returned handle controls the simulated
    /// tag; otherwise it is `None`.
    pub fn from_config(config: &EngineConfig) -> (Self, Option<MockProgrammerHandle>) {
        if config.mock_mode {
            let (device, handle) = MockProgrammer::new();
            (Self::Mock(device), Some(handle))
        } else {
            (Self::Hardware(ProxmarkProgrammer::new(config)), None)
        }
    }
}

impl ProgrammerDevice for AnyProgrammerDevice {
    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Hardware(device) => device.connect().await,
            Self::Mock(device) => device.connect().await,
        }
    }

    async fn is_tag_present(&mut self) -> Result<bool> {
        match self {
            Self::Hardware(device) => device.is_tag_present().await,
            Self::Mock(device) => device.is_tag_present().await,
        }
    }

    async fn write_block(
        &mut self,
        block: u8,
        data: &[u8; BLOCK_SIZE],
        key: &AuthKey,
    ) -> Result<()> {
        match self {
            Self::Hardware(device) => device.write_block(block, data, key).await,
            Self::Mock(device) => device.write_block(block, data, key).await,
        }
    }

    async fn read_block(&mut self, block: u8, key: &AuthKey) -> Result<[u8; BLOCK_SIZE]> {
        match self {
            Self::Hardware(device) => device.read_block(block, key).await,
            Self::Mock(device) => device.read_block(block, key).await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self {
            Self::Hardware(device) => device.disconnect().await,
            Self::Mock(device) => device.disconnect().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Hardware(device) => device.is_connected(),
            Self::Mock(device) => device.is_connected(),
        }
    }

    fn take_command_log(&mut self) -> Vec<CommandRecord> {
        match self {
            Self::Hardware(device) => device.take_command_log(),
            Self::Mock(device) => device.take_command_log(),
        }
    }
}
