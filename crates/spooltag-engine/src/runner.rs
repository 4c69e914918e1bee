//! Session worker.
//!
//! One `SessionRunner` owns the device connection for the lifetime of one
//! session and drives both tags through detect → write → verify, applying
//! the retry policy between attempts. It is the only component that
//! mutates session state; external callers observe progress through the
//! watch channel it publishes snapshots on.
//!
//! Cancellation is cooperative: the stop token is checked at every
//! suspension point, and the device is disconnected only after the
//! in-flight command returns — never mid-write.

use crate::audit::{AuditSender, TagAuditRecord};
use crate::detector::{DetectorError, TagCondition, TagDetector};
use crate::payload::TagPayload;
use crate::retry::RetryPolicy;
use crate::session::{AttemptError, ProgrammingSession, SessionSnapshot, TagPhase};
use crate::verify::{Verifier, VerifyError};
use crate::writer::{BlockIoError, write_payload};
use spooltag_core::Result;
use spooltag_core::types::{AuthKey, TagNumber};
use spooltag_device::{DeviceError, ProgrammerDevice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of processing one tag.
enum TagRun {
    Passed,
    Errored,
    Stopped,
}

/// How one waiting step ended.
enum WaitResult {
    Satisfied,
    Stopped,
    Failed(AttemptError),
}

pub(crate) struct SessionRunner<D: ProgrammerDevice> {
    pub(crate) device: D,
    pub(crate) session: ProgrammingSession,
    pub(crate) payload: TagPayload,
    pub(crate) keys: Vec<AuthKey>,
    pub(crate) detector: TagDetector,
    pub(crate) retry: RetryPolicy,
    pub(crate) verifier: Verifier,
    pub(crate) presence_timeout: Duration,
    pub(crate) removal_timeout: Duration,
    pub(crate) cancel: CancellationToken,
    pub(crate) status: Arc<watch::Sender<Option<SessionSnapshot>>>,
    pub(crate) audit: Option<AuditSender>,
}

impl<D: ProgrammerDevice> SessionRunner<D> {
    /// Drive the session to a terminal state and return it.
    pub(crate) async fn run(mut self) -> ProgrammingSession {
        info!(
            session_id = %self.session.session_id(),
            sku = %self.session.sku(),
            "programming session started"
        );
        self.publish();

        if let Err(e) = self.device.connect().await {
            self.forward_log();
            if self.cancel.is_cancelled() {
                self.session.mark_stopped();
            } else {
                warn!(error = %e, "device unavailable, session aborted");
                self.session.set_fatal(e.to_string());
            }
            self.publish();
            return self.session;
        }
        self.forward_log();

        let outcome = match self.run_tag(TagNumber::FIRST, false).await {
            Ok(TagRun::Passed) => self.run_tag(TagNumber::SECOND, true).await,
            other => other,
        };

        match outcome {
            Ok(TagRun::Stopped) => self.session.mark_stopped(),
            Ok(_) => {}
            Err(e) => {
                // A transition violated the phase table; this is an engine
                // bug, surfaced instead of silently continuing.
                warn!(error = %e, "internal state error, session aborted");
                self.session.set_fatal(e.to_string());
            }
        }

        if let Err(e) = self.device.disconnect().await {
            debug!(error = %e, "disconnect failed");
        }
        self.forward_log();
        self.publish();

        info!(state = %self.session.state(), "programming session finished");
        self.session
    }

    /// Run attempts for one tag until it passes, errors out, or the
    /// session is stopped. `initial_absence` forces a removal wait before
    /// the first detection (the previous tag is still on the antenna).
    async fn run_tag(&mut self, number: TagNumber, initial_absence: bool) -> Result<TagRun> {
        self.session.tag_mut(number).begin()?;
        self.publish();
        let mut pending_absence = initial_absence;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(TagRun::Stopped);
            }

            // Removal confirmation: on retry (so a failed tag cannot be
            // spuriously re-written while still mid-removal) and before
            // tag 2's first attempt.
            let retrying = self.session.tag(number).phase() == TagPhase::Fail;
            if retrying || pending_absence {
                match self.wait(TagCondition::Absent, self.removal_timeout).await {
                    WaitResult::Satisfied => {}
                    WaitResult::Stopped => return Ok(TagRun::Stopped),
                    WaitResult::Failed(err) => {
                        if !self.register_failure(number, err)? {
                            return Ok(TagRun::Errored);
                        }
                        continue;
                    }
                }
                pending_absence = false;

                if retrying {
                    if !self.sleep_cancellable(self.retry.delay()).await {
                        return Ok(TagRun::Stopped);
                    }
                    self.session.tag_mut(number).transition_to(TagPhase::AwaitingTag)?;
                    self.publish();
                }
            }

            // Wait for the operator to place the tag.
            match self.wait(TagCondition::Present, self.presence_timeout).await {
                WaitResult::Satisfied => {}
                WaitResult::Stopped => return Ok(TagRun::Stopped),
                WaitResult::Failed(err) => {
                    if !self.register_failure(number, err)? {
                        return Ok(TagRun::Errored);
                    }
                    continue;
                }
            }
            self.session.tag_mut(number).transition_to(TagPhase::Detected)?;
            debug!(tag = %number, "tag detected");
            self.publish();

            // Write all data blocks.
            self.session.tag_mut(number).transition_to(TagPhase::Writing)?;
            self.publish();
            match write_payload(&mut self.device, &self.payload, &self.keys, &self.cancel).await {
                Ok(()) => {}
                Err(BlockIoError::Cancelled) => return Ok(TagRun::Stopped),
                Err(BlockIoError::Device(e)) => {
                    self.forward_log();
                    if !self.register_failure(number, classify_write_error(e))? {
                        return Ok(TagRun::Errored);
                    }
                    continue;
                }
            }
            self.forward_log();

            // Verify per policy; tolerant mode passes straight from
            // writing.
            let content_hash = if self.verifier.is_strict() {
                self.session.tag_mut(number).transition_to(TagPhase::Verifying)?;
                self.publish();
                match self
                    .verifier
                    .verify(&mut self.device, &self.payload, &self.keys, &self.cancel)
                    .await
                {
                    Ok(hash) => {
                        self.forward_log();
                        Some(hash)
                    }
                    Err(VerifyError::Cancelled) => return Ok(TagRun::Stopped),
                    Err(e) => {
                        self.forward_log();
                        let err = AttemptError::VerificationMismatch {
                            message: e.to_string(),
                        };
                        if !self.register_failure(number, err)? {
                            return Ok(TagRun::Errored);
                        }
                        continue;
                    }
                }
            } else {
                None
            };

            self.session.tag_mut(number).transition_to(TagPhase::Pass)?;
            self.session.tag_mut(number).record_success(content_hash);
            info!(
                tag = %number,
                attempts = self.session.tag(number).attempts_used(),
                "tag programmed"
            );
            self.publish();
            self.emit_audit(number);
            return Ok(TagRun::Passed);
        }
    }

    /// Record a failed attempt; returns `Ok(true)` if another attempt may
    /// run, `Ok(false)` once the tag (and session) is terminally failed.
    fn register_failure(&mut self, number: TagNumber, error: AttemptError) -> Result<bool> {
        warn!(tag = %number, error = %error, "attempt failed");
        let retry_allowed = {
            let tag = self.session.tag_mut(number);
            tag.record_failure(error)?;
            self.retry.should_retry(tag.attempts_used())
        };

        if !retry_allowed {
            self.session.tag_mut(number).fail_terminal()?;
            self.publish();
            self.emit_audit(number);
            return Ok(false);
        }

        self.publish();
        Ok(true)
    }

    async fn wait(&mut self, condition: TagCondition, timeout: Duration) -> WaitResult {
        let result = self
            .detector
            .wait_for(&mut self.device, condition, timeout, &self.cancel)
            .await;
        self.forward_log();

        match result {
            Ok(()) => WaitResult::Satisfied,
            Err(DetectorError::Cancelled) => WaitResult::Stopped,
            Err(DetectorError::Timeout {
                condition,
                waited_ms,
            }) => WaitResult::Failed(AttemptError::DetectionTimeout {
                condition,
                waited_ms,
            }),
            Err(DetectorError::Device(e)) => WaitResult::Failed(AttemptError::DeviceFailure {
                message: e.to_string(),
            }),
        }
    }

    /// Sleep unless the stop token fires first; returns `false` on stop.
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot(self.retry.retry_limit());
        let _ = self.status.send(Some(snapshot));
    }

    fn emit_audit(&self, number: TagNumber) {
        if let Some(sender) = &self.audit {
            let record = TagAuditRecord::from_attempt(&self.session, self.session.tag(number));
            let _ = sender.send(record);
        }
    }

    fn forward_log(&mut self) {
        for record in self.device.take_command_log() {
            debug!(
                command = %record.command,
                success = record.success,
                duration_ms = record.duration_ms,
                "device command"
            );
        }
    }
}

fn classify_write_error(error: DeviceError) -> AttemptError {
    match error {
        DeviceError::AuthenticationFailed { .. } => AttemptError::AuthenticationFailed,
        other => AttemptError::WriteFailed {
            message: other.to_string(),
        },
    }
}
