//! Generation install, activation and cleanup.

use std::fmt;
use std::sync::Arc;

use qbank_core::cache::stores::{self, expected_store_names};
use qbank_core::{AppConfig, CacheDb, Error, StoreKind};
use url::Url;

use crate::net::NetworkBackend;
use crate::request::InterceptedRequest;

/// Lifecycle states of one daemon instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Pre-populating the app-shell store.
    Installing,
    /// Installed behind an active previous generation; not serving.
    Waiting,
    /// Running the cleanup pass; not serving yet.
    Activating,
    /// Controlling pages and serving intercepted requests.
    Active,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonState::Installing => write!(f, "installing"),
            DaemonState::Waiting => write!(f, "waiting"),
            DaemonState::Activating => write!(f, "activating"),
            DaemonState::Active => write!(f, "active"),
        }
    }
}

/// Pre-populate the app-shell store with the fixed document list so the
/// very first offline navigation succeeds even before any page has been
/// visited online.
///
/// Any failure is fatal to the install: the generation must never become
/// eligible to activate with a known-broken shell.
pub async fn install(
    db: &CacheDb, config: &AppConfig, backend: &Arc<dyn NetworkBackend>,
) -> Result<(), Error> {
    let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let store = StoreKind::AppShell.store_name(&config.generation);

    for path in &config.app_shell {
        let url = origin
            .join(path)
            .map_err(|e| Error::InstallFailed(format!("bad app-shell path {path}: {e}")))?;
        let request = InterceptedRequest::get(url.as_str())?;

        let response = backend
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed(format!("failed to fetch {path}: {e}")))?;
        if !response.is_success() {
            return Err(Error::InstallFailed(format!("unexpected status {} for {path}", response.status)));
        }

        db.put_entry(&store, &request.cache_key(), &response)
            .await
            .map_err(|e| Error::InstallFailed(format!("failed to store {path}: {e}")))?;
    }

    tracing::info!(generation = %config.generation, documents = config.app_shell.len(), "app shell installed");
    Ok(())
}

/// Cleanup pass run when a generation becomes eligible to control pages:
/// every durable store outside the generation's expected set is deleted.
///
/// Returns whether an app-shell store of a previous generation existed
/// before cleanup. This gates the subsequent update notification,
/// so a first-ever install never produces an update prompt.
pub async fn activate(db: &CacheDb, generation: &str) -> Result<bool, Error> {
    let expected = expected_store_names(generation);
    let existing = db.store_names().await?;

    let had_previous = existing
        .iter()
        .any(|name| stores::is_previous_app_shell(name, generation));

    for name in existing.iter().filter(|name| !expected.contains(*name)) {
        let removed = db.delete_store(name).await?;
        tracing::info!(store = %name, entries = removed, "removed stale cache store");
    }

    Ok(had_previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, response};
    use qbank_core::cache::hash::request_key;

    fn config() -> AppConfig {
        AppConfig {
            generation: "g2".into(),
            origin: "https://qbank.example.com".into(),
            ..Default::default()
        }
    }

    fn backend() -> (Arc<MockBackend>, Arc<dyn NetworkBackend>) {
        let mock = Arc::new(MockBackend::new());
        let dynamic: Arc<dyn NetworkBackend> = mock.clone();
        (mock, dynamic)
    }

    fn script_shell(mock: &MockBackend) {
        mock.ok("https://qbank.example.com/", "<html>root</html>");
        mock.ok("https://qbank.example.com/index.html", "<html>root</html>");
        mock.ok("https://qbank.example.com/offline.html", "<html>offline</html>");
        mock.ok("https://qbank.example.com/manifest.json", "{}");
    }

    #[tokio::test]
    async fn test_install_populates_app_shell() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (mock, backend) = backend();
        script_shell(&mock);

        install(&db, &config(), &backend).await.unwrap();

        assert_eq!(db.count_entries("app-shell-vg2").await.unwrap(), 4);
        let key = request_key("GET", "https://qbank.example.com/offline.html");
        assert!(db.get_entry("app-shell-vg2", &key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_install_fails_on_missing_document() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (mock, backend) = backend();
        mock.ok("https://qbank.example.com/", "<html>root</html>");
        mock.ok("https://qbank.example.com/index.html", "<html>root</html>");
        // offline.html unreachable: install must not complete

        let result = install(&db, &config(), &backend).await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
    }

    #[tokio::test]
    async fn test_install_fails_on_error_status() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (mock, backend) = backend();
        mock.status("https://qbank.example.com/", 404, "not found");

        let result = install(&db, &config(), &backend).await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
    }

    #[tokio::test]
    async fn test_activate_deletes_everything_outside_expected_set() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for store in ["app-shell-vg1", "static-vg1", "supabase-rest-vg1", "junk-store", "app-shell-vg2"] {
            db.put_entry(store, "k", &response("https://qbank.example.com/x", 200, "x"))
                .await
                .unwrap();
        }

        let had_previous = activate(&db, "g2").await.unwrap();

        assert!(had_previous);
        assert_eq!(db.store_names().await.unwrap(), vec!["app-shell-vg2"]);
    }

    #[tokio::test]
    async fn test_activate_on_fresh_install_reports_no_previous() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("app-shell-vg2", "k", &response("https://qbank.example.com/x", 200, "x"))
            .await
            .unwrap();

        let had_previous = activate(&db, "g2").await.unwrap();

        assert!(!had_previous);
        assert_eq!(db.store_names().await.unwrap(), vec!["app-shell-vg2"]);
    }
}
