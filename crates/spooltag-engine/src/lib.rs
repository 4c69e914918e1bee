//! Auto-programming engine for dual-tag filament spools.
//!
//! This crate owns the detect → program → verify lifecycle for the two
//! MIFARE Classic 1K tags of a spool:
//!
//! - [`payload`]: read-only SKU → 1024-byte image lookup.
//! - [`catalog`]: filament metadata and per-SKU key overrides.
//! - [`detector`]: debounced tag presence/absence polling.
//! - [`writer`] / [`verify`]: block writes with candidate-key iteration
//!   and strict/tolerant read-back verification.
//! - [`retry`]: bounded re-attempt policy.
//! - [`session`]: per-tag phases, the derived session state, snapshots.
//! - [`manager`]: the external surface — start, status, stop.
//! - [`audit`]: records emitted for every completed tag.
//!
//! # Concurrency model
//!
//! A single worker task owns the device connection for a session's
//! lifetime; no other component issues device commands concurrently.
//! External callers interact purely through [`SessionManager`]: start and
//! stop mutate under one mutex, status reads are watch-channel snapshots.
//! Stop is cooperative and observed at every suspension point.

pub mod audit;
pub mod catalog;
pub mod detector;
pub mod manager;
pub mod payload;
pub mod retry;
mod runner;
pub mod session;
pub mod verify;
pub mod writer;

pub use audit::{AuditReceiver, AuditSender, TagAuditRecord, TagOutcome, audit_channel};
pub use catalog::{FilamentCatalog, FilamentEntry};
pub use detector::{DetectorError, TagCondition, TagDetector};
pub use manager::SessionManager;
pub use payload::{DirectoryPayloadStore, MemoryPayloadStore, PayloadStore, TagPayload};
pub use retry::RetryPolicy;
pub use session::{
    AttemptError, ProgrammingSession, SessionSnapshot, SessionState, TagAttempt,
    TagAttemptSnapshot, TagPhase,
};
pub use verify::{Verifier, VerifyError, content_hash, first_mismatch};
