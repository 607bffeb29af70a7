//! Cached response entries and per-store CRUD operations.
//!
//! Entries are keyed `(store, request_key)`. A logical store exists as soon
//! as it holds an entry and disappears when its last entry is deleted, which
//! gives the lazy store-creation semantics for free.

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response: status, headers and body of a previously fetched
/// resource, plus the fetch timestamp used for freshness and trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl StoredResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the entry is younger than `max_age`.
    ///
    /// A clock that moved backwards makes the entry look fetched in the
    /// future; treat that as fresh rather than forcing a refetch.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        match (Utc::now() - self.fetched_at).to_std() {
            Ok(age) => age <= max_age,
            Err(_) => true,
        }
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl CacheDb {
    /// Insert or overwrite the entry for a request key within a store.
    ///
    /// Concurrent writers to the same key race only on final content;
    /// last write wins.
    pub async fn put_entry(&self, store: &str, key: &str, response: &StoredResponse) -> Result<(), Error> {
        let store = store.to_string();
        let key = key.to_string();
        let response = response.clone();
        let headers_json =
            serde_json::to_string(&response.headers).map_err(|e| Error::Encoding(e.to_string()))?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (store, request_key, url, status, headers_json, body, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(store, request_key) DO UPDATE SET
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        fetched_at = excluded.fetched_at",
                    params![
                        &store,
                        &key,
                        &response.url,
                        response.status as i64,
                        &headers_json,
                        &response.body,
                        response.fetched_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the entry for a request key, or None if the store has no copy.
    pub async fn get_entry(&self, store: &str, key: &str) -> Result<Option<StoredResponse>, Error> {
        let store = store.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let result = conn.query_row(
                    "SELECT url, status, headers_json, body, fetched_at
                     FROM entries WHERE store = ?1 AND request_key = ?2",
                    params![store, key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Vec<u8>>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                );

                match result {
                    Ok((url, status, headers_json, body, fetched_at)) => {
                        let headers = serde_json::from_str(&headers_json)
                            .map_err(|e| Error::Encoding(e.to_string()))?;
                        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
                            .map_err(|e| Error::Encoding(e.to_string()))?
                            .with_timezone(&Utc);
                        Ok(Some(StoredResponse { url, status: status as u16, headers, body, fetched_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry in a store.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_store(&self, store: &str) -> Result<u64, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE store = ?1", params![store])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every store currently holding at least one entry.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT store FROM entries ORDER BY store")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a store.
    pub async fn count_entries(&self, store: &str) -> Result<u64, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE store = ?1",
                    params![store],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Evict oldest entries until the store holds at most `max_entries`.
    ///
    /// Returns the number of deleted entries.
    pub async fn trim_store(&self, store: &str, max_entries: usize) -> Result<u64, Error> {
        let store = store.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE store = ?1",
                    params![store],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE store = ?1 AND request_key IN (
                        SELECT request_key FROM entries WHERE store = ?1
                        ORDER BY fetched_at ASC LIMIT ?2
                    )",
                    params![store, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::request_key;

    fn make_response(url: &str, body: &str) -> StoredResponse {
        StoredResponse {
            url: url.to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: body.as_bytes().to_vec(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let response = make_response("https://example.com/app.js", "console.log(1)");
        let key = request_key("GET", &response.url);

        db.put_entry("static-vg1", &key, &response).await.unwrap();

        let cached = db.get_entry("static-vg1", &key).await.unwrap().unwrap();
        assert_eq!(cached.url, response.url);
        assert_eq!(cached.body, response.body);
        assert_eq!(cached.header("Content-Type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cached = db.get_entry("static-vg1", "nonexistent").await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = request_key("GET", "https://example.com/data");

        db.put_entry("dynamic-vg1", &key, &make_response("https://example.com/data", "old"))
            .await
            .unwrap();
        db.put_entry("dynamic-vg1", &key, &make_response("https://example.com/data", "new"))
            .await
            .unwrap();

        let cached = db.get_entry("dynamic-vg1", &key).await.unwrap().unwrap();
        assert_eq!(cached.body, b"new");
        assert_eq!(db.count_entries("dynamic-vg1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_store_is_scoped() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = request_key("GET", "https://example.com/x");

        db.put_entry("static-vg1", &key, &make_response("https://example.com/x", "a"))
            .await
            .unwrap();
        db.put_entry("dynamic-vg1", &key, &make_response("https://example.com/x", "b"))
            .await
            .unwrap();

        let deleted = db.delete_store("dynamic-vg1").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_entry("dynamic-vg1", &key).await.unwrap().is_none());
        assert!(db.get_entry("static-vg1", &key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_names_lists_nonempty_stores() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.store_names().await.unwrap().is_empty());

        let key = request_key("GET", "https://example.com/x");
        db.put_entry("app-shell-vg1", &key, &make_response("https://example.com/x", "a"))
            .await
            .unwrap();

        assert_eq!(db.store_names().await.unwrap(), vec!["app-shell-vg1"]);
    }

    #[tokio::test]
    async fn test_trim_evicts_oldest_first() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for i in 0..4i64 {
            let url = format!("https://example.com/{i}");
            let mut response = make_response(&url, "x");
            response.fetched_at = Utc::now() - chrono::Duration::seconds(100 - i);
            db.put_entry("supabase-rest-vg1", &request_key("GET", &url), &response)
                .await
                .unwrap();
        }

        let deleted = db.trim_store("supabase-rest-vg1", 2).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.count_entries("supabase-rest-vg1").await.unwrap(), 2);

        // the two oldest are gone, the two newest remain
        let oldest = request_key("GET", "https://example.com/0");
        let newest = request_key("GET", "https://example.com/3");
        assert!(db.get_entry("supabase-rest-vg1", &oldest).await.unwrap().is_none());
        assert!(db.get_entry("supabase-rest-vg1", &newest).await.unwrap().is_some());
    }

    #[test]
    fn test_freshness_window() {
        let mut response = make_response("https://example.com/x", "a");
        assert!(response.is_fresh(Duration::from_secs(60)));

        response.fetched_at = Utc::now() - chrono::Duration::seconds(120);
        assert!(!response.is_fresh(Duration::from_secs(60)));
        assert!(response.is_fresh(Duration::from_secs(600)));
    }
}
