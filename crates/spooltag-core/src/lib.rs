//! Core types for the Spooltag dual-tag RFID programming engine.
//!
//! This crate holds the pieces every other workspace member depends on:
//! the error taxonomy, validated domain newtypes ([`Sku`], [`AuthKey`],
//! [`TagNumber`], [`SessionId`]), the MIFARE Classic 1K layout constants
//! and the [`EngineConfig`](config::EngineConfig) structure.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{EngineConfig, VerificationMode};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
