//! The update state machine held by each open page.
//!
//! Two states, two user actions. The hand-off itself is driven over two
//! channels: the daemon's explicit messages (which carry the version) and
//! the controller-change signal (which is what actually means "the code
//! under this page just swapped"). The reload guard consumes the latter at
//! most once per page lifetime, because the platform may deliver it more
//! than once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use qbank_core::{DaemonHandle, DaemonMessage, PageConnection, PageMessage, Registry};

/// Whether an update is currently offerable to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Idle,
    UpdateReady,
}

/// Per-page update controller.
///
/// Cloning is cheap and clones share the same state, so every mount point
/// in the UI can hold its own copy. The "full reload" platform action is
/// injected at construction so the state machine stays free of host
/// specifics.
#[derive(Clone)]
pub struct UpdateController {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    status: Mutex<UpdateStatus>,
    pending: Mutex<Option<DaemonHandle>>,
    listener_started: AtomicBool,
    reloaded: AtomicBool,
    on_reload: Box<dyn Fn() + Send + Sync>,
}

impl UpdateController {
    pub fn new(registry: Arc<Registry>, on_reload: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                status: Mutex::new(UpdateStatus::Idle),
                pending: Mutex::new(None),
                listener_started: AtomicBool::new(false),
                reloaded: AtomicBool::new(false),
                on_reload: Box::new(on_reload),
            }),
        }
    }

    pub fn status(&self) -> UpdateStatus {
        *self.inner.status_guard()
    }

    /// Attach to the registry and start listening. Idempotent: calling
    /// from multiple mount points registers exactly one listener, so a
    /// hand-off can never trigger duplicate reloads.
    ///
    /// Also checks for an instance that was already waiting before this
    /// page loaded, which would otherwise never announce itself again.
    pub fn setup(&self) {
        if self.inner.listener_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("update listener already registered");
            return;
        }

        if let Some(waiting) = self.inner.registry.waiting()
            && self.inner.registry.active_generation().is_some()
        {
            self.inner.set_update_ready(waiting);
        }

        let connection = self.inner.registry.attach_page();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.listen(connection).await });
    }

    /// Apply the waiting update. Only valid in `UpdateReady`; the state
    /// machine stays put, the transition back to `Idle` happens through
    /// the reload once the new generation takes control.
    ///
    /// Returns whether the skip-waiting message was posted.
    pub fn apply(&self) -> bool {
        if self.status() != UpdateStatus::UpdateReady {
            tracing::debug!("apply ignored outside update-ready state");
            return false;
        }
        match self.inner.pending_guard().as_ref() {
            Some(waiting) => {
                waiting.post(PageMessage::SkipWaiting);
                true
            }
            None => false,
        }
    }

    /// Decline the update for this page visit. The daemon stays waiting,
    /// so the same update is offered again on the next page load.
    pub fn dismiss(&self) {
        *self.inner.status_guard() = UpdateStatus::Idle;
        *self.inner.pending_guard() = None;
        tracing::debug!("update dismissed");
    }

    #[cfg(test)]
    pub(crate) fn handle_daemon_message(&self, message: DaemonMessage) {
        self.inner.handle_daemon_message(message);
    }

    #[cfg(test)]
    pub(crate) fn handle_controller_change(&self) {
        self.inner.handle_controller_change();
    }
}

impl Inner {
    async fn listen(&self, connection: PageConnection) {
        let PageConnection { mut messages, mut controller } = connection;
        loop {
            tokio::select! {
                message = messages.recv() => match message {
                    Some(message) => self.handle_daemon_message(message),
                    None => break,
                },
                changed = controller.changed() => match changed {
                    Ok(()) => self.handle_controller_change(),
                    Err(_) => break,
                },
            }
        }
    }

    fn handle_daemon_message(&self, message: DaemonMessage) {
        match message {
            DaemonMessage::UpdateReady { version } => {
                // re-read the registry rather than trusting the message:
                // a rapid double-deploy may have superseded the sender
                if let Some(waiting) = self.registry.waiting() {
                    tracing::info!(version = %version, "update available");
                    self.set_update_ready(waiting);
                }
            }
            DaemonMessage::Updated { version } => {
                tracing::info!(version = %version, "new generation finished taking control");
            }
        }
    }

    fn handle_controller_change(&self) {
        *self.status_guard() = UpdateStatus::Idle;
        *self.pending_guard() = None;

        if self.reloaded.swap(true, Ordering::SeqCst) {
            tracing::debug!("controller change already consumed");
            return;
        }
        tracing::info!("controller changed, reloading page");
        (self.on_reload)();
    }

    fn set_update_ready(&self, waiting: DaemonHandle) {
        *self.pending_guard() = Some(waiting);
        *self.status_guard() = UpdateStatus::UpdateReady;
    }

    fn status_guard(&self) -> MutexGuard<'_, UpdateStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending_guard(&self) -> MutexGuard<'_, Option<DaemonHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
