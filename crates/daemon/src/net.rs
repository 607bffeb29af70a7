//! Network backend behind the caching strategies.
//!
//! The trait seam exists so the strategies and lifecycle can be exercised
//! against a scripted backend; the real implementation wraps a reqwest
//! client with timeout, redirect and response-size limits.

use async_trait::async_trait;
use chrono::Utc;
use qbank_core::{AppConfig, Error, StoredResponse};
use reqwest::{Client, Method};

use crate::request::InterceptedRequest;

/// Origin network access, as the strategies see it.
///
/// Returns Ok for any completed HTTP exchange regardless of status code;
/// Err means the network itself failed (refused, unreachable, timed out).
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<StoredResponse, Error>;
}

/// HTTP backend with safety limits.
pub struct HttpBackend {
    http: Client,
    max_bytes: usize,
}

impl HttpBackend {
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, max_bytes: config.max_bytes })
    }
}

#[async_trait]
impl NetworkBackend for HttpBackend {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<StoredResponse, Error> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::Http(format!("invalid method: {}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        if let Some(accept) = &request.accept {
            builder = builder.header("Accept", accept);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::FetchTimeout(request.url.to_string())
            } else {
                Error::Http(format!("network error: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if let Some(len) = response.content_length()
            && len as usize > self.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.max_bytes)));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("failed to read response: {e}")))?;

        if body.len() > self.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.max_bytes)));
        }

        tracing::debug!(url = %request.url, status, bytes = body.len(), "fetched from origin");

        Ok(StoredResponse {
            url: final_url,
            status,
            headers,
            body: body.to_vec(),
            fetched_at: Utc::now(),
        })
    }
}
