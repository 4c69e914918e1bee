//! Audit records for completed tag attempts.
//!
//! Every tag that reaches `pass` or `error` yields one record, handed to
//! the logging collaborator over an unbounded channel. The engine emits
//! records but never persists them.

use crate::session::{ProgrammingSession, TagAttempt, TagPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spooltag_core::{SessionId, Sku, TagNumber};

/// Terminal result of a tag attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOutcome {
    /// Tag programmed (and verified, in strict mode).
    Pass,

    /// Attempts exhausted.
    Error,
}

/// Audit record for one completed tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAuditRecord {
    /// Session the tag belonged to.
    pub session_id: SessionId,

    /// SKU programmed.
    pub sku: Sku,

    /// Tag position (1 or 2).
    pub tag_number: TagNumber,

    /// Attempts consumed, successful one included.
    pub attempts_used: u32,

    /// Terminal result.
    pub result: TagOutcome,

    /// Content hash of the verified payload (strict mode passes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Final classified error, for failed tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When tag processing began.
    pub started_at: Option<DateTime<Utc>>,

    /// When the tag reached its terminal phase.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TagAuditRecord {
    /// Build a record from a tag that reached a terminal phase.
    pub fn from_attempt(session: &ProgrammingSession, attempt: &TagAttempt) -> Self {
        let result = if attempt.phase() == TagPhase::Pass {
            TagOutcome::Pass
        } else {
            TagOutcome::Error
        };

        Self {
            session_id: session.session_id(),
            sku: session.sku().clone(),
            tag_number: attempt.tag_number(),
            attempts_used: attempt.attempts_used(),
            result,
            content_hash: attempt.content_hash().map(str::to_owned),
            error: match result {
                TagOutcome::Pass => None,
                TagOutcome::Error => attempt.last_error().map(|e| e.to_string()),
            },
            started_at: attempt.started_at(),
            finished_at: attempt.finished_at(),
        }
    }
}

/// Channel end the engine emits audit records on.
pub type AuditSender = tokio::sync::mpsc::UnboundedSender<TagAuditRecord>;

/// Channel end the logging collaborator consumes.
pub type AuditReceiver = tokio::sync::mpsc::UnboundedReceiver<TagAuditRecord>;

/// Create an audit channel pair.
pub fn audit_channel() -> (AuditSender, AuditReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
