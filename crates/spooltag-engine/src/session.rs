//! Programming session state.
//!
//! A session programs two tags in sequence for one spool. Each tag's
//! progress is a [`TagAttempt`] moving through [`TagPhase`]s; the
//! session-level [`SessionState`] is always a pure function of the two tag
//! phases plus the stop and fatal flags — it is never stored separately,
//! so it cannot drift.
//!
//! # Phases
//!
//! Per tag: `pending → awaiting_tag → detected → writing → verifying →
//! {pass | fail}`. Under the tolerant policy `writing` moves straight to
//! `pass`. A `fail` either re-enters `awaiting_tag` (attempts remain, tag
//! absence confirmed first) or becomes `error` (limit reached).
//!
//! Tag 2 never begins before tag 1 reaches `pass`.

use crate::detector::TagCondition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spooltag_core::{Error, Result, SessionId, Sku, TagNumber};
use std::fmt;

/// Phase of a single tag within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPhase {
    /// Not started yet.
    Pending,

    /// Waiting for the operator to place the tag.
    AwaitingTag,

    /// Tag observed on the antenna.
    Detected,

    /// Block writes in progress.
    Writing,

    /// Read-back comparison in progress (strict mode only).
    Verifying,

    /// Tag programmed (and verified, in strict mode).
    Pass,

    /// The current attempt failed; may retry or escalate to `Error`.
    Fail,

    /// All attempts exhausted.
    Error,
}

impl TagPhase {
    /// Check if transition to target phase is valid from this phase.
    pub fn can_transition_to(&self, target: &TagPhase) -> bool {
        matches!(
            (self, target),
            (TagPhase::Pending, TagPhase::AwaitingTag)
                | (TagPhase::AwaitingTag, TagPhase::Detected | TagPhase::Fail)
                | (TagPhase::Detected, TagPhase::Writing)
                | (TagPhase::Writing, TagPhase::Verifying | TagPhase::Pass | TagPhase::Fail)
                | (TagPhase::Verifying, TagPhase::Pass | TagPhase::Fail)
                | (TagPhase::Fail, TagPhase::AwaitingTag | TagPhase::Error)
        )
    }

    /// Whether this phase ends the tag's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TagPhase::Pass | TagPhase::Error)
    }
}

impl fmt::Display for TagPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagPhase::Pending => "pending",
            TagPhase::AwaitingTag => "awaiting_tag",
            TagPhase::Detected => "detected",
            TagPhase::Writing => "writing",
            TagPhase::Verifying => "verifying",
            TagPhase::Pass => "pass",
            TagPhase::Fail => "fail",
            TagPhase::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Classified failure of one attempt.
///
/// Attempt-level errors are absorbed by the retry policy and only surface
/// as the session's final `error` state after the limit is exhausted; the
/// latest one is always visible in status snapshots so a polling caller
/// can render operator guidance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptError {
    /// No configured key authenticated the tag.
    #[error("authentication failed with all configured keys")]
    AuthenticationFailed,

    /// A block write was rejected.
    #[error("write failed: {message}")]
    WriteFailed { message: String },

    /// Read-back did not match the intended payload.
    #[error("verification failed: {message}")]
    VerificationMismatch { message: String },

    /// The operator did not place or remove the tag in time.
    #[error("tag not {condition} within {waited_ms}ms")]
    DetectionTimeout {
        condition: TagCondition,
        waited_ms: u64,
    },

    /// A device command failed outside the write/verify paths.
    #[error("device failure: {message}")]
    DeviceFailure { message: String },
}

/// One tag's progress within a session.
#[derive(Debug, Clone)]
pub struct TagAttempt {
    tag_number: TagNumber,
    phase: TagPhase,
    attempts_used: u32,
    last_error: Option<AttemptError>,
    content_hash: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TagAttempt {
    /// Create a fresh attempt record in `pending`.
    pub fn new(tag_number: TagNumber) -> Self {
        Self {
            tag_number,
            phase: TagPhase::Pending,
            attempts_used: 0,
            last_error: None,
            content_hash: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Tag position (1 or 2).
    #[must_use]
    pub fn tag_number(&self) -> TagNumber {
        self.tag_number
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TagPhase {
        self.phase
    }

    /// Detect/write/verify cycles used so far (successful one included).
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Latest classified failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&AttemptError> {
        self.last_error.as_ref()
    }

    /// Content hash recorded on strict-mode success.
    #[must_use]
    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    /// When the tag's processing began.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the tag reached a terminal phase.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Move to `new_phase`, validating the transition.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` if the move is not allowed
    /// by the phase table.
    pub fn transition_to(&mut self, new_phase: TagPhase) -> Result<()> {
        if !self.phase.can_transition_to(&new_phase) {
            return Err(Error::InvalidStateTransition {
                from: self.phase.to_string(),
                to: new_phase.to_string(),
            });
        }
        self.phase = new_phase;
        Ok(())
    }

    /// Start processing: `pending → awaiting_tag`, stamping `started_at`.
    pub fn begin(&mut self) -> Result<()> {
        self.transition_to(TagPhase::AwaitingTag)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record a failed attempt: count it, remember the error, and move to
    /// `fail` unless already there (an absence-wait can fail while the
    /// phase is still `fail` from the previous attempt).
    pub fn record_failure(&mut self, error: AttemptError) -> Result<()> {
        self.attempts_used += 1;
        self.last_error = Some(error);
        if self.phase != TagPhase::Fail {
            self.transition_to(TagPhase::Fail)?;
        }
        Ok(())
    }

    /// Record the successful attempt: count it and stamp `finished_at`.
    /// The caller transitions the phase to `pass` separately.
    pub fn record_success(&mut self, content_hash: Option<String>) {
        self.attempts_used += 1;
        self.content_hash = content_hash;
        self.finished_at = Some(Utc::now());
    }

    /// Escalate `fail` to `error` once attempts are exhausted.
    pub fn fail_terminal(&mut self) -> Result<()> {
        self.transition_to(TagPhase::Error)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn snapshot(&self, retry_limit: u32) -> TagAttemptSnapshot {
        TagAttemptSnapshot {
            tag_number: self.tag_number,
            phase: self.phase,
            attempts_used: self.attempts_used,
            attempts_remaining: retry_limit.saturating_sub(self.attempts_used),
            last_error: self.last_error.clone(),
            content_hash: self.content_hash.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Session-level composite state, derived from the two tag phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session created, tag 1 not started.
    Idle,

    /// Tag 1 is being detected, written or verified.
    Tag1InProgress,

    /// Tag 1 passed; waiting for tag 2 to be placed.
    Tag1DoneAwaitingTag2,

    /// Tag 2 is being detected, written or verified.
    Tag2InProgress,

    /// Both tags passed.
    Complete,

    /// A tag exhausted its attempts or the device was unavailable.
    Error,

    /// Stopped by external request.
    Stopped,
}

impl SessionState {
    /// Whether the session has ended.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Tag1InProgress => "tag1_in_progress",
            SessionState::Tag1DoneAwaitingTag2 => "tag1_done_awaiting_tag2",
            SessionState::Tag2InProgress => "tag2_in_progress",
            SessionState::Complete => "complete",
            SessionState::Error => "error",
            SessionState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Pure mapping from tag phases (and the stop/fatal flags) to the
/// session-level state.
pub fn session_state(tag1: TagPhase, tag2: TagPhase, stopped: bool, fatal: bool) -> SessionState {
    if stopped {
        return SessionState::Stopped;
    }
    if fatal || tag1 == TagPhase::Error || tag2 == TagPhase::Error {
        return SessionState::Error;
    }
    if tag1 == TagPhase::Pending {
        return SessionState::Idle;
    }
    if tag1 != TagPhase::Pass {
        return SessionState::Tag1InProgress;
    }
    match tag2 {
        TagPhase::Pending | TagPhase::AwaitingTag => SessionState::Tag1DoneAwaitingTag2,
        TagPhase::Pass => SessionState::Complete,
        _ => SessionState::Tag2InProgress,
    }
}

/// Aggregate root for one dual-tag programming run.
///
/// Owned by the session worker; external callers only ever see
/// [`SessionSnapshot`]s.
#[derive(Debug, Clone)]
pub struct ProgrammingSession {
    session_id: SessionId,
    sku: Sku,
    created_at: DateTime<Utc>,
    tag1: TagAttempt,
    tag2: TagAttempt,
    stopped: bool,
    fatal_error: Option<String>,
}

impl ProgrammingSession {
    /// Create a new session for a SKU.
    pub fn new(sku: Sku) -> Self {
        Self {
            session_id: SessionId::new(),
            sku,
            created_at: Utc::now(),
            tag1: TagAttempt::new(TagNumber::FIRST),
            tag2: TagAttempt::new(TagNumber::SECOND),
            stopped: false,
            fatal_error: None,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// SKU being programmed.
    #[must_use]
    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    /// Tag attempt by position.
    #[must_use]
    pub fn tag(&self, number: TagNumber) -> &TagAttempt {
        match number {
            n if n == TagNumber::FIRST => &self.tag1,
            _ => &self.tag2,
        }
    }

    /// Mutable tag attempt by position.
    pub fn tag_mut(&mut self, number: TagNumber) -> &mut TagAttempt {
        match number {
            n if n == TagNumber::FIRST => &mut self.tag1,
            _ => &mut self.tag2,
        }
    }

    /// Derived session-level state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        session_state(
            self.tag1.phase(),
            self.tag2.phase(),
            self.stopped,
            self.fatal_error.is_some(),
        )
    }

    /// Force the terminal `stopped` state.
    pub fn mark_stopped(&mut self) {
        self.stopped = true;
    }

    /// Record a session-fatal error (device unavailable at connect).
    pub fn set_fatal(&mut self, message: impl Into<String>) {
        self.fatal_error = Some(message.into());
    }

    /// Produce an externally visible snapshot.
    #[must_use]
    pub fn snapshot(&self, retry_limit: u32) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            sku: self.sku.clone(),
            created_at: self.created_at,
            state: self.state(),
            tag1: self.tag1.snapshot(retry_limit),
            tag2: self.tag2.snapshot(retry_limit),
            fatal_error: self.fatal_error.clone(),
        }
    }
}

/// Externally visible view of one tag's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAttemptSnapshot {
    /// Tag position (1 or 2).
    pub tag_number: TagNumber,

    /// Current phase.
    pub phase: TagPhase,

    /// Attempts consumed so far.
    pub attempts_used: u32,

    /// Attempts still available.
    pub attempts_remaining: u32,

    /// Latest classified failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<AttemptError>,

    /// Content hash recorded on strict-mode success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// When processing began.
    pub started_at: Option<DateTime<Utc>>,

    /// When a terminal phase was reached.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Externally visible view of a session, returned by status polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: SessionId,

    /// SKU being programmed.
    pub sku: Sku,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// Derived session-level state.
    pub state: SessionState,

    /// Tag 1 progress.
    pub tag1: TagAttemptSnapshot,

    /// Tag 2 progress.
    pub tag2: TagAttemptSnapshot,

    /// Session-fatal error, if the device was unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}
