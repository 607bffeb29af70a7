//! Scripted network backend for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use qbank_core::{Error, StoredResponse};

use crate::net::NetworkBackend;
use crate::request::InterceptedRequest;

type Script = HashMap<String, VecDeque<Result<StoredResponse, Error>>>;

/// Backend that replays scripted responses per URL and records every fetch.
/// A URL with no remaining script fails like an unreachable network.
pub(crate) struct MockBackend {
    script: Mutex<Script>,
    log: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self { script: Mutex::new(HashMap::new()), log: Mutex::new(Vec::new()) }
    }

    fn script_guard(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ok(&self, url: &str, body: &str) {
        self.push(url, Ok(response(url, 200, body)));
    }

    pub fn status(&self, url: &str, status: u16, body: &str) {
        self.push(url, Ok(response(url, status, body)));
    }

    pub fn fail(&self, url: &str) {
        self.push(url, Err(Error::Http("connection refused".to_string())));
    }

    fn push(&self, url: &str, result: Result<StoredResponse, Error>) {
        self.script_guard().entry(url.to_string()).or_default().push_back(result);
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|fetched| fetched.as_str() == url)
            .count()
    }
}

#[async_trait]
impl NetworkBackend for MockBackend {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<StoredResponse, Error> {
        let url = request.url.to_string();
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(url.clone());
        match self.script_guard().get_mut(&url).and_then(|queue| queue.pop_front()) {
            Some(result) => result,
            None => Err(Error::Http(format!("no scripted response for {url}"))),
        }
    }
}

pub(crate) fn response(url: &str, status: u16, body: &str) -> StoredResponse {
    StoredResponse {
        url: url.to_string(),
        status,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: body.as_bytes().to_vec(),
        fetched_at: Utc::now(),
    }
}

pub(crate) fn stale_response(url: &str, body: &str, age_secs: i64) -> StoredResponse {
    let mut stored = response(url, 200, body);
    stored.fetched_at = Utc::now() - chrono::Duration::seconds(age_secs);
    stored
}
