//! Page registry and controller hand-off signaling.
//!
//! The host runtime keeps daemon instances and pages in separate processes;
//! everything between them goes through explicit channels, never shared
//! memory. The registry models the host's bookkeeping: which pages are
//! attached, which daemon instance is waiting, which one controls the pages,
//! and the controller-change signal each page observes.
//!
//! At most one instance is active and at most one is waiting. A newer
//! waiting instance replaces an older one, so a rapid double-deploy leaves
//! only the newest generation offerable to pages.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::protocol::{DaemonMessage, PageMessage};

/// Address of one daemon instance: its generation plus the channel pages
/// use to post messages to it.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    generation: String,
    sender: mpsc::UnboundedSender<PageMessage>,
}

impl DaemonHandle {
    pub fn new(generation: impl Into<String>, sender: mpsc::UnboundedSender<PageMessage>) -> Self {
        Self { generation: generation.into(), sender }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Post a message to the daemon instance. A send to an instance that
    /// already shut down is dropped silently.
    pub fn post(&self, message: PageMessage) {
        if self.sender.send(message).is_err() {
            tracing::debug!(generation = %self.generation, "daemon instance is gone, message dropped");
        }
    }
}

/// One page's view of the registry: the daemon's message stream plus the
/// controller-change signal.
#[derive(Debug)]
pub struct PageConnection {
    pub messages: mpsc::UnboundedReceiver<DaemonMessage>,
    pub controller: watch::Receiver<Option<String>>,
}

#[derive(Debug, Default)]
struct Inner {
    pages: Vec<mpsc::UnboundedSender<DaemonMessage>>,
    waiting: Option<DaemonHandle>,
    active: Option<DaemonHandle>,
}

/// Registry of attached pages and resident daemon instances for one origin.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Inner>,
    controller: watch::Sender<Option<String>>,
}

impl Registry {
    pub fn new() -> Self {
        let (controller, _) = watch::channel(None);
        Self { inner: Mutex::new(Inner::default()), controller }
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a page, returning its message stream and controller signal.
    ///
    /// The controller receiver starts at the current controller, so a page
    /// attaching after an activation does not observe a spurious change.
    pub fn attach_page(&self) -> PageConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        self.locked().pages.push(tx);
        PageConnection { messages: rx, controller: self.controller.subscribe() }
    }

    /// Post a message to every attached page, dropping closed connections.
    pub fn broadcast(&self, message: DaemonMessage) {
        self.locked().pages.retain(|page| page.send(message.clone()).is_ok());
    }

    pub fn page_count(&self) -> usize {
        self.locked().pages.len()
    }

    /// The waiting daemon instance, if any.
    pub fn waiting(&self) -> Option<DaemonHandle> {
        self.locked().waiting.clone()
    }

    /// Generation of the instance currently controlling pages.
    pub fn active_generation(&self) -> Option<String> {
        self.locked().active.as_ref().map(|handle| handle.generation.clone())
    }

    /// Park an installed instance behind the active one. Replaces any
    /// previously waiting instance.
    pub fn set_waiting(&self, handle: DaemonHandle) {
        let mut inner = self.locked();
        if let Some(previous) = &inner.waiting {
            tracing::info!(
                superseded = %previous.generation,
                generation = %handle.generation,
                "newer waiting instance supersedes older one"
            );
        }
        inner.waiting = Some(handle);
    }

    /// Promote an instance to sole controller of all attached pages.
    ///
    /// Fires the controller-change signal, but only when the controlling
    /// generation actually changes; re-claiming by the same generation
    /// must not trigger page reloads.
    pub fn claim(&self, handle: DaemonHandle) {
        let generation = handle.generation.clone();
        {
            let mut inner = self.locked();
            if inner.waiting.as_ref().map(|w| w.generation.as_str()) == Some(generation.as_str()) {
                inner.waiting = None;
            }
            inner.active = Some(handle);
        }
        self.controller.send_if_modified(|current| {
            if current.as_deref() == Some(generation.as_str()) {
                false
            } else {
                *current = Some(generation);
                true
            }
        });
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(generation: &str) -> (DaemonHandle, mpsc::UnboundedReceiver<PageMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DaemonHandle::new(generation, tx), rx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_pages() {
        let registry = Registry::new();
        let mut first = registry.attach_page();
        let mut second = registry.attach_page();

        registry.broadcast(DaemonMessage::UpdateReady { version: "g2".into() });

        assert_eq!(
            first.messages.recv().await,
            Some(DaemonMessage::UpdateReady { version: "g2".into() })
        );
        assert_eq!(
            second.messages.recv().await,
            Some(DaemonMessage::UpdateReady { version: "g2".into() })
        );
    }

    #[tokio::test]
    async fn test_broadcast_drops_closed_pages() {
        let registry = Registry::new();
        let connection = registry.attach_page();
        drop(connection);

        registry.broadcast(DaemonMessage::Updated { version: "g2".into() });
        assert_eq!(registry.page_count(), 0);
    }

    #[tokio::test]
    async fn test_claim_fires_controller_change_once_per_generation() {
        let registry = Registry::new();
        let mut connection = registry.attach_page();

        let (first, _rx) = handle("g1");
        registry.claim(first.clone());
        assert!(connection.controller.has_changed().unwrap());
        connection.controller.mark_unchanged();

        // same generation claiming again must not re-signal
        registry.claim(first);
        assert!(!connection.controller.has_changed().unwrap());

        let (second, _rx) = handle("g2");
        registry.claim(second);
        assert!(connection.controller.has_changed().unwrap());
        assert_eq!(connection.controller.borrow_and_update().as_deref(), Some("g2"));
    }

    #[tokio::test]
    async fn test_claim_clears_matching_waiting_slot() {
        let registry = Registry::new();
        let (waiting, _rx) = handle("g2");
        registry.set_waiting(waiting.clone());
        assert!(registry.waiting().is_some());

        registry.claim(waiting);
        assert!(registry.waiting().is_none());
        assert_eq!(registry.active_generation().as_deref(), Some("g2"));
    }

    #[tokio::test]
    async fn test_newer_waiting_instance_supersedes() {
        let registry = Registry::new();
        let (older, _rx1) = handle("g2");
        let (newer, _rx2) = handle("g3");

        registry.set_waiting(older);
        registry.set_waiting(newer);

        assert_eq!(registry.waiting().unwrap().generation(), "g3");
    }

    #[tokio::test]
    async fn test_page_attached_late_sees_no_spurious_change() {
        let registry = Registry::new();
        let (active, _rx) = handle("g1");
        registry.claim(active);

        let connection = registry.attach_page();
        assert!(!connection.controller.has_changed().unwrap());
        assert_eq!(connection.controller.borrow().as_deref(), Some("g1"));
    }

    #[tokio::test]
    async fn test_post_to_dead_daemon_is_silent() {
        let (daemon, rx) = handle("g1");
        drop(rx);
        daemon.post(PageMessage::SkipWaiting);
    }
}
