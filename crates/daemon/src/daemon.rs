//! The cache daemon service: one instance per resident generation.
//!
//! The instance owns its lifecycle explicitly: install, then either
//! immediate activation (nothing is controlling pages yet) or waiting
//! behind the active previous generation until a page posts SKIP_WAITING.
//! Request handling awaits a readiness gate that only opens after the
//! activation cleanup resolves, so no request is ever served against a
//! store set that still contains stale generations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use qbank_core::{
    AppConfig, CacheDb, DaemonHandle, DaemonMessage, Error, PageMessage, Registry, StoreKind,
};
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::classify::{Classifier, Route};
use crate::lifecycle::{self, DaemonState};
use crate::navigation;
use crate::net::NetworkBackend;
use crate::request::InterceptedRequest;
use crate::strategy;

/// Result of running one intercepted request through the daemon.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The request is not intercepted; the page goes to the network itself.
    Bypass,
    /// The daemon produced a response (from store or network).
    Response(qbank_core::StoredResponse),
}

pub struct CacheDaemon {
    config: AppConfig,
    db: CacheDb,
    backend: Arc<dyn NetworkBackend>,
    classifier: Classifier,
    registry: Arc<Registry>,
    origin: Url,
    handle: DaemonHandle,
    state: Mutex<DaemonState>,
    ready: watch::Sender<bool>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<PageMessage>>>,
}

impl CacheDaemon {
    /// Install this generation and register it with the host.
    ///
    /// A failed install is fatal: the instance is discarded and whatever
    /// generation currently controls pages keeps doing so. After a
    /// successful install the instance either activates immediately (no
    /// active controller of another generation) or parks as waiting and
    /// announces itself to every open page.
    pub async fn register(
        config: AppConfig, db: CacheDb, backend: Arc<dyn NetworkBackend>, registry: Arc<Registry>,
    ) -> Result<Arc<Self>, Error> {
        let classifier = Classifier::new(&config)?;
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (ready, _) = watch::channel(false);
        let handle = DaemonHandle::new(config.generation.clone(), inbox_tx);

        let daemon = Arc::new(Self {
            config,
            db,
            backend,
            classifier,
            registry,
            origin,
            handle,
            state: Mutex::new(DaemonState::Installing),
            ready,
            inbox: Mutex::new(Some(inbox_rx)),
        });

        tracing::info!(generation = %daemon.config.generation, "installing cache generation");
        lifecycle::install(&daemon.db, &daemon.config, &daemon.backend).await?;

        match daemon.registry.active_generation() {
            Some(active) if active != daemon.config.generation => {
                daemon.set_state(DaemonState::Waiting);
                daemon.registry.set_waiting(daemon.handle.clone());
                daemon
                    .registry
                    .broadcast(DaemonMessage::UpdateReady { version: daemon.config.generation.clone() });
            }
            _ => daemon.activate().await?,
        }

        Ok(daemon)
    }

    pub fn state(&self) -> DaemonState {
        *self.state_guard()
    }

    pub fn generation(&self) -> &str {
        &self.config.generation
    }

    fn state_guard(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: DaemonState) {
        *self.state_guard() = state;
        tracing::info!(generation = %self.config.generation, state = %state, "daemon state changed");
    }

    /// Run the cleanup pass, claim control of all pages and open the
    /// readiness gate. Blocks until cleanup resolves.
    pub async fn activate(&self) -> Result<(), Error> {
        self.set_state(DaemonState::Activating);
        let had_previous = lifecycle::activate(&self.db, &self.config.generation).await?;

        self.registry.claim(self.handle.clone());
        self.set_state(DaemonState::Active);
        self.ready.send_replace(true);

        if had_previous {
            self.registry
                .broadcast(DaemonMessage::Updated { version: self.config.generation.clone() });
        }

        Ok(())
    }

    /// Answer one intercepted request, waiting for activation first.
    pub async fn handle_fetch(&self, request: &InterceptedRequest) -> Result<FetchOutcome, Error> {
        self.wait_ready().await?;

        let generation = &self.config.generation;
        match self.classifier.classify(request) {
            Route::Bypass => Ok(FetchOutcome::Bypass),
            Route::Navigation => {
                let store = StoreKind::AppShell.store_name(generation);
                navigation::navigate(&self.db, &store, &self.backend, &self.origin, request)
                    .await
                    .map(FetchOutcome::Response)
            }
            Route::StaleWhileRevalidate { store } => {
                let store = store.store_name(generation);
                let (response, _revalidation) =
                    strategy::stale_while_revalidate(&self.db, &store, &self.backend, request).await?;
                Ok(FetchOutcome::Response(response))
            }
            Route::NetworkFirst { store, policy } => {
                let store = store.store_name(generation);
                strategy::network_first(&self.db, &store, &policy, &self.backend, request)
                    .await
                    .map(FetchOutcome::Response)
            }
            Route::CacheFirst { store, policy } => {
                let store = store.store_name(generation);
                strategy::cache_first(&self.db, &store, &policy, &self.backend, request)
                    .await
                    .map(FetchOutcome::Response)
            }
        }
    }

    async fn wait_ready(&self) -> Result<(), Error> {
        let mut ready = self.ready.subscribe();
        while !*ready.borrow_and_update() {
            ready
                .changed()
                .await
                .map_err(|_| Error::Lifecycle("daemon dropped before activation".to_string()))?;
        }
        Ok(())
    }

    /// Handle one message posted by a page.
    pub async fn handle_message(&self, message: PageMessage) -> Result<(), Error> {
        match message {
            PageMessage::SkipWaiting => {
                if self.state() == DaemonState::Waiting {
                    self.activate().await
                } else {
                    tracing::debug!(
                        generation = %self.config.generation,
                        state = %self.state(),
                        "skip-waiting ignored outside waiting state"
                    );
                    Ok(())
                }
            }
            PageMessage::Logout => {
                let store = StoreKind::Dynamic.store_name(&self.config.generation);
                let removed = self.db.delete_store(&store).await?;
                tracing::info!(entries = removed, "cleared dynamic cache on logout");
                Ok(())
            }
        }
    }

    /// Drain the page-message inbox until every sender is gone.
    /// Subsequent calls return immediately; the inbox is consumed once.
    pub async fn run(self: Arc<Self>) {
        let inbox = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut inbox) = inbox else { return };

        while let Some(message) = inbox.recv().await {
            if let Err(err) = self.handle_message(message).await {
                tracing::warn!(generation = %self.config.generation, error = %err, "message handling failed");
            }
        }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }
}
