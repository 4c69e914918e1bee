//! Session manager.
//!
//! The externally visible surface of the engine: start a session, poll
//! its status, stop it. At most one session is active system-wide; a
//! second `start_session` is rejected (not queued) while one is running.
//!
//! The manager is an owned object — tests can instantiate independent
//! managers side by side — and all start/stop mutation goes through one
//! async mutex, while status reads are watch-channel snapshots that never
//! block the worker.

use crate::audit::AuditSender;
use crate::catalog::FilamentCatalog;
use crate::detector::TagDetector;
use crate::payload::PayloadStore;
use crate::retry::RetryPolicy;
use crate::runner::SessionRunner;
use crate::session::{ProgrammingSession, SessionSnapshot};
use crate::verify::Verifier;
use spooltag_core::{EngineConfig, Error, Result, Sku};
use spooltag_device::{AnyProgrammerDevice, MockProgrammerHandle};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct ManagerInner {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<ProgrammingSession>>,
}

/// Owns the single active programming session and the device used for it.
pub struct SessionManager {
    config: EngineConfig,
    store: Arc<dyn PayloadStore>,
    catalog: Option<FilamentCatalog>,
    device_template: AnyProgrammerDevice,
    mock_handle: Option<MockProgrammerHandle>,
    status_tx: Arc<watch::Sender<Option<SessionSnapshot>>>,
    status_rx: watch::Receiver<Option<SessionSnapshot>>,
    audit_tx: Option<AuditSender>,
    inner: Mutex<ManagerInner>,
}

impl SessionManager {
    /// Create a manager over a payload store, selecting the device
    /// variant from configuration.
    ///
    /// # Errors
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn new(config: EngineConfig, store: Arc<dyn PayloadStore>) -> Result<Self> {
        config.validate()?;
        let (device_template, mock_handle) = AnyProgrammerDevice::from_config(&config);
        let (status_tx, status_rx) = watch::channel(None);

        Ok(Self {
            config,
            store,
            catalog: None,
            device_template,
            mock_handle,
            status_tx: Arc::new(status_tx),
            status_rx,
            audit_tx: None,
            inner: Mutex::new(ManagerInner {
                cancel: None,
                task: None,
            }),
        })
    }

    /// Replace the device (tests inject a mock they hold the handle for).
    #[must_use]
    pub fn with_device(mut self, device: AnyProgrammerDevice) -> Self {
        self.device_template = device;
        self.mock_handle = None;
        self
    }

    /// Attach a filament catalog for per-SKU key overrides.
    #[must_use]
    pub fn with_catalog(mut self, catalog: FilamentCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Attach the audit channel records are emitted on.
    #[must_use]
    pub fn with_audit(mut self, sender: AuditSender) -> Self {
        self.audit_tx = Some(sender);
        self
    }

    /// Control handle of the mock device, when running in mock mode.
    pub fn mock_handle(&self) -> Option<&MockProgrammerHandle> {
        self.mock_handle.as_ref()
    }

    /// Start a session for a SKU.
    ///
    /// The worker task owns the device for the session's lifetime; this
    /// call returns as soon as the session exists.
    ///
    /// # Errors
    /// `Error::SessionAlreadyActive` while another session is
    /// non-terminal (the running session is left untouched),
    /// `Error::InvalidSku` / `Error::UnknownSku` for unusable SKUs.
    /// None of these mutate any state.
    pub async fn start_session(&self, sku: &str) -> Result<SessionSnapshot> {
        let sku = Sku::new(sku)?;
        let mut inner = self.inner.lock().await;

        if let Some(active) = self.status_rx.borrow().clone() {
            if !active.state.is_terminal() {
                return Err(Error::SessionAlreadyActive {
                    session_id: active.session_id.to_string(),
                });
            }
        }

        let payload = self.store.get_payload(&sku)?;
        let keys = self
            .catalog
            .as_ref()
            .and_then(|c| c.keys_for(&sku))
            .map(<[_]>::to_vec)
            .unwrap_or_else(|| self.config.default_keys.clone());

        let session = ProgrammingSession::new(sku);
        let snapshot = session.snapshot(self.config.retry_limit);
        let cancel = CancellationToken::new();

        let runner = SessionRunner {
            device: self.device_template.clone(),
            session,
            payload,
            keys,
            detector: TagDetector::from_config(&self.config),
            retry: RetryPolicy::from_config(&self.config),
            verifier: Verifier::new(self.config.verification),
            presence_timeout: self.config.presence_timeout(),
            removal_timeout: self.config.removal_timeout(),
            cancel: cancel.clone(),
            status: Arc::clone(&self.status_tx),
            audit: self.audit_tx.clone(),
        };

        let _ = self.status_tx.send(Some(snapshot.clone()));
        inner.cancel = Some(cancel);
        inner.task = Some(tokio::spawn(runner.run()));

        info!(session_id = %snapshot.session_id, sku = %snapshot.sku, "session accepted");
        Ok(snapshot)
    }

    /// Latest session snapshot, if a session was ever started.
    ///
    /// Non-blocking: reads the watch channel, never touches the worker.
    pub fn status(&self) -> Option<SessionSnapshot> {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates (for UIs and tests).
    pub fn watch(&self) -> watch::Receiver<Option<SessionSnapshot>> {
        self.status_rx.clone()
    }

    /// Whether a session is currently non-terminal.
    pub fn is_active(&self) -> bool {
        self.status_rx
            .borrow()
            .as_ref()
            .is_some_and(|s| !s.state.is_terminal())
    }

    /// Stop the active session, if any.
    ///
    /// Idempotent: a no-op when nothing is running. Cancellation is
    /// cooperative — the worker finishes its in-flight device command,
    /// disconnects, and publishes the terminal `stopped` snapshot before
    /// this call returns.
    pub async fn stop_session(&self) {
        let mut inner = self.inner.lock().await;

        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = inner.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "session worker panicked");
            }
            info!("session stopped");
        }
    }

    /// Wait for the active session to finish on its own, returning the
    /// terminal snapshot (used by headless callers like the CLI).
    pub async fn wait_until_terminal(&self) -> Option<SessionSnapshot> {
        let mut rx = self.watch();
        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                Some(snapshot) if snapshot.state.is_terminal() => return Some(snapshot),
                None => return None,
                _ => {}
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}
