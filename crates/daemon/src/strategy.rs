//! The three caching strategies.
//!
//! Each strategy operates on a request and a named store and returns a
//! response; its only side effects are writes to the store. A failed cache
//! write never fails the request that produced the response.

use std::sync::Arc;

use qbank_core::{CacheDb, Error, StoredResponse};
use tokio::task::JoinHandle;

use crate::classify::CachePolicy;
use crate::net::NetworkBackend;
use crate::request::InterceptedRequest;

/// Serve from the store, fetching only on a miss or stale hit.
///
/// Appropriate for content that is effectively immutable within its
/// freshness window. A stale hit triggers a refetch, but if the network
/// then fails the stale copy is still served; the error surfaces only
/// when the store holds nothing at all.
pub async fn cache_first(
    db: &CacheDb, store: &str, policy: &CachePolicy, backend: &Arc<dyn NetworkBackend>,
    request: &InterceptedRequest,
) -> Result<StoredResponse, Error> {
    let key = request.cache_key();
    let cached = db.get_entry(store, &key).await?;

    if let Some(hit) = &cached
        && hit.is_fresh(policy.max_age)
    {
        tracing::debug!(store, url = %request.url, "cache-first hit");
        return Ok(hit.clone());
    }

    match backend.fetch(request).await {
        Ok(response) => {
            store_response(db, store, policy.max_entries, &key, &response).await;
            Ok(response)
        }
        Err(err) => match cached {
            Some(stale) => {
                tracing::debug!(store, url = %request.url, error = %err, "network failed, serving stale copy");
                Ok(stale)
            }
            None => {
                tracing::debug!(store, url = %request.url, error = %err, "network failed with empty store");
                Err(Error::NoOfflineCopy { url: request.url.to_string() })
            }
        },
    }
}

/// Fetch from the network, falling back to the store when it fails.
///
/// Used where freshness matters more than availability but offline
/// usability is still wanted as a degraded mode; a cached copy is served
/// on failure regardless of age.
pub async fn network_first(
    db: &CacheDb, store: &str, policy: &CachePolicy, backend: &Arc<dyn NetworkBackend>,
    request: &InterceptedRequest,
) -> Result<StoredResponse, Error> {
    let key = request.cache_key();

    match backend.fetch(request).await {
        Ok(response) => {
            store_response(db, store, policy.max_entries, &key, &response).await;
            Ok(response)
        }
        Err(err) => match db.get_entry(store, &key).await? {
            Some(hit) => {
                tracing::debug!(store, url = %request.url, error = %err, "network failed, serving cached copy");
                Ok(hit)
            }
            None => {
                tracing::debug!(store, url = %request.url, error = %err, "network failed with empty store");
                Err(Error::NoOfflineCopy { url: request.url.to_string() })
            }
        },
    }
}

/// Serve the stored entry immediately and refresh it in the background.
///
/// The revalidation task is returned so callers can await it; the daemon
/// drops it (fire-and-forget) but tests join it for determinism. A failed
/// revalidation is logged and swallowed; the cached response has already
/// been returned, so nothing may surface as an error. With no stored
/// entry the caller waits for the network like a plain fetch.
pub async fn stale_while_revalidate(
    db: &CacheDb, store: &str, backend: &Arc<dyn NetworkBackend>, request: &InterceptedRequest,
) -> Result<(StoredResponse, Option<JoinHandle<()>>), Error> {
    let key = request.cache_key();

    if let Some(hit) = db.get_entry(store, &key).await? {
        tracing::debug!(store, url = %request.url, "serving stale, revalidating in background");
        let db = db.clone();
        let store = store.to_string();
        let backend = Arc::clone(backend);
        let request = request.clone();
        let revalidation = tokio::spawn(async move {
            match backend.fetch(&request).await {
                Ok(response) => store_response(&db, &store, None, &key, &response).await,
                Err(err) => {
                    tracing::debug!(store = %store, url = %request.url, error = %err, "background revalidation failed");
                }
            }
        });
        return Ok((hit, Some(revalidation)));
    }

    let response = backend.fetch(request).await?;
    store_response(db, store, None, &key, &response).await;
    Ok((response, None))
}

/// Write a successful response to the store and trim to the entry cap.
///
/// Write and trim failures are logged and swallowed: the response has
/// already been fetched and must reach the caller regardless.
pub(crate) async fn store_response(
    db: &CacheDb, store: &str, max_entries: Option<usize>, key: &str, response: &StoredResponse,
) {
    if !response.is_success() {
        tracing::debug!(store, status = response.status, "not caching non-success response");
        return;
    }

    if let Err(err) = db.put_entry(store, key, response).await {
        tracing::warn!(store, url = %response.url, error = %err, "cache write failed");
        return;
    }

    if let Some(cap) = max_entries
        && let Err(err) = db.trim_store(store, cap).await
    {
        tracing::warn!(store, error = %err, "cache trim failed");
    }
}
