//! Debounced tag presence/absence detection.
//!
//! Raw antenna reads are noisy immediately after a tag is placed or
//! removed, so a single reading is never trusted: the detector polls the
//! device on a fixed interval and only reports a condition once it has
//! held for a configured number of consecutive polls.

use serde::{Deserialize, Serialize};
use spooltag_core::config::EngineConfig;
use spooltag_device::{DeviceError, ProgrammerDevice};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Condition the detector waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCondition {
    /// A tag is in the antenna field.
    Present,

    /// The antenna field is empty.
    Absent,
}

impl TagCondition {
    fn matches(self, present: bool) -> bool {
        match self {
            Self::Present => present,
            Self::Absent => !present,
        }
    }
}

impl fmt::Display for TagCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "placed"),
            Self::Absent => write!(f, "removed"),
        }
    }
}

/// Errors produced while waiting for a tag condition.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// The condition did not hold within the caller's timeout.
    #[error("tag not {condition} within {waited_ms}ms")]
    Timeout {
        condition: TagCondition,
        waited_ms: u64,
    },

    /// A stop request interrupted the wait.
    #[error("detection cancelled by stop request")]
    Cancelled,

    /// The presence poll itself failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Debounced presence/absence poller.
#[derive(Debug, Clone)]
pub struct TagDetector {
    interval: Duration,
    debounce: u32,
}

impl TagDetector {
    /// Create a detector with an explicit interval and debounce count.
    ///
    /// The debounce count is the number of consecutive agreeing polls
    /// required; [`EngineConfig::validate`] enforces the minimum of 2.
    pub fn new(interval: Duration, debounce: u32) -> Self {
        Self { interval, debounce }
    }

    /// Build a detector from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.detection_interval(), config.debounce_polls)
    }

    /// Poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `condition` holds for the debounce count, the timeout
    /// elapses, or `cancel` fires.
    ///
    /// The cancellation token is checked before every poll and during the
    /// inter-poll sleep, so stop requests are observed within one poll
    /// cycle plus the in-flight command's own timeout.
    ///
    /// # Errors
    /// `DetectorError::Timeout` when the deadline passes,
    /// `DetectorError::Cancelled` on stop, `DetectorError::Device` if a
    /// poll fails outright.
    pub async fn wait_for<D: ProgrammerDevice>(
        &self,
        device: &mut D,
        condition: TagCondition,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DetectorError> {
        let deadline = Instant::now() + timeout;
        let mut consecutive = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(DetectorError::Cancelled);
            }

            let present = device.is_tag_present().await?;
            if condition.matches(present) {
                consecutive += 1;
                if consecutive >= self.debounce {
                    return Ok(());
                }
            } else {
                consecutive = 0;
            }

            if Instant::now() >= deadline {
                return Err(DetectorError::Timeout {
                    condition,
                    waited_ms: timeout.as_millis() as u64,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(DetectorError::Cancelled),
                _ = tokio::time::sleep_until(deadline.min(Instant::now() + self.interval)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spooltag_device::MockProgrammer;

    fn fast_detector() -> TagDetector {
        TagDetector::new(Duration::from_millis(1), 2)
    }

    async fn connected_mock() -> (MockProgrammer, spooltag_device::MockProgrammerHandle) {
        let (mut device, handle) = MockProgrammer::new();
        handle.set_latency(Duration::ZERO);
        device.connect().await.unwrap();
        (device, handle)
    }

    #[tokio::test]
    async fn test_detects_present_tag() {
        let (mut device, handle) = connected_mock().await;
        handle.place_tag();

        let cancel = CancellationToken::new();
        let result = fast_detector()
            .wait_for(&mut device, TagCondition::Present, Duration::from_secs(1), &cancel)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_detects_absence() {
        let (mut device, _handle) = connected_mock().await;

        let cancel = CancellationToken::new();
        let result = fast_detector()
            .wait_for(&mut device, TagCondition::Absent, Duration::from_secs(1), &cancel)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_times_out_when_tag_never_placed() {
        let (mut device, _handle) = connected_mock().await;

        let cancel = CancellationToken::new();
        let result = fast_detector()
            .wait_for(
                &mut device,
                TagCondition::Present,
                Duration::from_millis(20),
                &cancel,
            )
            .await;

        match result {
            Err(DetectorError::Timeout { condition, .. }) => {
                assert_eq!(condition, TagCondition::Present);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let (mut device, _handle) = connected_mock().await;

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let result = fast_detector()
            .wait_for(
                &mut device,
                TagCondition::Present,
                Duration::from_secs(30),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(DetectorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_debounce_requires_consecutive_polls() {
        let (mut device, handle) = connected_mock().await;

        // Place the tag mid-wait; the detector still needs two agreeing
        // polls after placement before it reports presence.
        let handle_clone = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle_clone.place_tag();
        });

        let cancel = CancellationToken::new();
        let detector = TagDetector::new(Duration::from_millis(2), 3);
        let result = detector
            .wait_for(&mut device, TagCondition::Present, Duration::from_secs(1), &cancel)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_poll_failure_surfaces_device_error() {
        let (mut device, _handle) = MockProgrammer::new();

        // Never connected: the first poll fails.
        let cancel = CancellationToken::new();
        let result = fast_detector()
            .wait_for(&mut device, TagCondition::Present, Duration::from_secs(1), &cancel)
            .await;
        assert!(matches!(result, Err(DetectorError::Device(_))));
    }
}
