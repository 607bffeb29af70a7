//! Navigation fallback chain.
//!
//! A previously-visited user who is now offline always gets a working (if
//! stale) application shell instead of a connection error, and a user with
//! a live network always gets the freshest shell. Tried in order:
//!
//! 1. Live network fetch (also refreshes the cached root document)
//! 2. Cached root document
//! 3. Cached offline fallback document
//! 4. Synthesized 503 response

use std::sync::Arc;

use chrono::Utc;
use qbank_core::cache::hash::request_key;
use qbank_core::config::{OFFLINE_DOCUMENT, ROOT_DOCUMENT};
use qbank_core::{CacheDb, Error, StoredResponse};
use url::Url;

use crate::net::NetworkBackend;
use crate::request::InterceptedRequest;
use crate::strategy::store_response;

/// Answer a navigation request through the fallback chain against the
/// app-shell store.
pub async fn navigate(
    db: &CacheDb, store: &str, backend: &Arc<dyn NetworkBackend>, origin: &Url,
    request: &InterceptedRequest,
) -> Result<StoredResponse, Error> {
    match backend.fetch(request).await {
        Ok(response) => {
            // any successful navigation refreshes the shell for future
            // offline use, whatever document was actually requested
            store_response(db, store, None, &shell_key(origin, ROOT_DOCUMENT)?, &response).await;
            Ok(response)
        }
        Err(err) => {
            tracing::debug!(url = %request.url, error = %err, "navigation fetch failed, falling back to shell");

            if let Some(shell) = lookup(db, store, &shell_key(origin, ROOT_DOCUMENT)?).await {
                return Ok(shell);
            }
            if let Some(offline) = lookup(db, store, &shell_key(origin, OFFLINE_DOCUMENT)?).await {
                return Ok(offline);
            }
            Ok(unavailable_response(request.url.as_str()))
        }
    }
}

/// Cache key of an app-shell document, resolved against the origin.
pub fn shell_key(origin: &Url, path: &str) -> Result<String, Error> {
    let url = origin.join(path).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    Ok(request_key("GET", url.as_str()))
}

/// Store read failures must not break the chain; a failed read is a miss.
async fn lookup(db: &CacheDb, store: &str, key: &str) -> Option<StoredResponse> {
    match db.get_entry(store, key).await {
        Ok(entry) => entry,
        Err(err) => {
            tracing::warn!(store, error = %err, "shell lookup failed, treating as miss");
            None
        }
    }
}

/// The last-resort response when no network and no cached shell exist.
fn unavailable_response(url: &str) -> StoredResponse {
    StoredResponse {
        url: url.to_string(),
        status: 503,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: b"Offline".to_vec(),
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, response};

    const STORE: &str = "app-shell-vg1";

    fn origin() -> Url {
        Url::parse("https://qbank.example.com").unwrap()
    }

    fn backend() -> (Arc<MockBackend>, Arc<dyn NetworkBackend>) {
        let mock = Arc::new(MockBackend::new());
        let dynamic: Arc<dyn NetworkBackend> = mock.clone();
        (mock, dynamic)
    }

    #[tokio::test]
    async fn test_online_navigation_refreshes_shell() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (mock, backend) = backend();
        let request = InterceptedRequest::navigation("https://qbank.example.com/review").unwrap();
        mock.ok(request.url.as_str(), "<html>fresh</html>");

        let served = navigate(&db, STORE, &backend, &origin(), &request).await.unwrap();

        assert_eq!(served.body, b"<html>fresh</html>");
        let shell = db
            .get_entry(STORE, &shell_key(&origin(), ROOT_DOCUMENT).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shell.body, b"<html>fresh</html>");
    }

    #[tokio::test]
    async fn test_offline_serves_cached_root_document() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_mock, backend) = backend();
        let key = shell_key(&origin(), ROOT_DOCUMENT).unwrap();
        db.put_entry(STORE, &key, &response("https://qbank.example.com/index.html", 200, "<html>shell</html>"))
            .await
            .unwrap();

        let request = InterceptedRequest::navigation("https://qbank.example.com/practice").unwrap();
        let served = navigate(&db, STORE, &backend, &origin(), &request).await.unwrap();

        assert_eq!(served.body, b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_offline_without_root_serves_offline_document() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_mock, backend) = backend();
        let key = shell_key(&origin(), OFFLINE_DOCUMENT).unwrap();
        db.put_entry(STORE, &key, &response("https://qbank.example.com/offline.html", 200, "<html>offline</html>"))
            .await
            .unwrap();

        let request = InterceptedRequest::navigation("https://qbank.example.com/").unwrap();
        let served = navigate(&db, STORE, &backend, &origin(), &request).await.unwrap();

        assert_eq!(served.body, b"<html>offline</html>");
    }

    #[tokio::test]
    async fn test_empty_store_synthesizes_503() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_mock, backend) = backend();

        let request = InterceptedRequest::navigation("https://qbank.example.com/").unwrap();
        let served = navigate(&db, STORE, &backend, &origin(), &request).await.unwrap();

        assert_eq!(served.status, 503);
        assert_eq!(served.body, b"Offline");
        assert_eq!(served.header("content-type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_failed_navigation_response_not_cached_as_shell() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (mock, backend) = backend();
        let request = InterceptedRequest::navigation("https://qbank.example.com/missing").unwrap();
        mock.status(request.url.as_str(), 404, "not found");

        let served = navigate(&db, STORE, &backend, &origin(), &request).await.unwrap();

        assert_eq!(served.status, 404);
        assert!(
            db.get_entry(STORE, &shell_key(&origin(), ROOT_DOCUMENT).unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }
}
