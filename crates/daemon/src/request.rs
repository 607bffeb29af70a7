//! Intercepted request model and URL canonicalization.

use qbank_core::Error;
use qbank_core::cache::hash::request_key;
use url::Url;

/// Whether a request loads a new HTML document or a subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    Subresource,
}

/// One outgoing request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub accept: Option<String>,
}

impl InterceptedRequest {
    /// A plain GET subresource request.
    pub fn get(url: &str) -> Result<Self, Error> {
        Ok(Self {
            method: "GET".to_string(),
            url: canonicalize(url)?,
            mode: RequestMode::Subresource,
            accept: None,
        })
    }

    /// A navigation request for an HTML document.
    pub fn navigation(url: &str) -> Result<Self, Error> {
        Ok(Self {
            method: "GET".to_string(),
            url: canonicalize(url)?,
            mode: RequestMode::Navigate,
            accept: Some("text/html".to_string()),
        })
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_accept(mut self, accept: &str) -> Self {
        self.accept = Some(accept.to_string());
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Cache key identifying this request within a store.
    pub fn cache_key(&self) -> String {
        request_key(&self.method, self.url.as_str())
    }
}

/// Canonicalize a URL string for consistent cache keys.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
