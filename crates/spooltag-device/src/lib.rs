//! Device command client for the Spooltag programming engine.
//!
//! This crate owns all communication with the tag reader/programmer. It
//! presents a small capability surface — connect, presence poll, block
//! read/write, disconnect — behind the [`ProgrammerDevice`] trait, with
//! two implementations:
//!
//! - [`ProxmarkProgrammer`](hardware::ProxmarkProgrammer): issues commands
//!   to the physical Proxmark3 through the `pm3` client process and parses
//!   its text output, with a hard timeout per command.
//! - [`MockProgrammer`](mock::MockProgrammer): a simulated device with
//!   controllable tag presence, key acceptance and failure injection, used
//!   by the test suites and `mock_mode` deployments.
//!
//! The active variant is chosen once at construction via
//! [`AnyProgrammerDevice`](devices::AnyProgrammerDevice) (enum dispatch —
//! the trait's native `async fn` methods are not object-safe).
//!
//! # Contracts
//!
//! All operations fail fast with a typed [`DeviceError`]; nothing retries
//! internally. Every command is captured as a [`CommandRecord`] the caller
//! drains for audit purposes — this crate persists nothing.

pub mod command;
pub mod devices;
pub mod error;
pub mod hardware;
pub mod mock;
pub mod traits;

pub use command::CommandRecord;
pub use devices::AnyProgrammerDevice;
pub use error::{DeviceError, Result};
pub use hardware::ProxmarkProgrammer;
pub use mock::{MockProgrammer, MockProgrammerHandle};
pub use traits::ProgrammerDevice;
