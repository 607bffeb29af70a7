//! Unified error types for the offline engine.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the cache daemon and the page client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request or configuration URL failed to parse.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("cache database error: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("cache database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be encoded or decoded.
    #[error("cache entry encoding error: {0}")]
    Encoding(String),

    /// Network fetch failed.
    #[error("network error: {0}")]
    Http(String),

    /// Network fetch timed out.
    #[error("network timeout: {0}")]
    FetchTimeout(String),

    /// Response body exceeded the configured size cap.
    #[error("response too large: {0}")]
    FetchTooLarge(String),

    /// The network is unreachable and the store holds no copy.
    #[error("no connectivity and no offline copy for {url}")]
    NoOfflineCopy { url: String },

    /// App-shell pre-population failed; the generation never activates.
    #[error("install failed: {0}")]
    InstallFailed(String),

    /// The daemon lifecycle broke down (e.g. dropped before activation).
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_offline_copy_display() {
        let err = Error::NoOfflineCopy { url: "https://example.com/api".into() };
        assert!(err.to_string().contains("no offline copy"));
        assert!(err.to_string().contains("https://example.com/api"));
    }

    #[test]
    fn test_install_failed_display() {
        let err = Error::InstallFailed("missing /offline.html".into());
        assert!(err.to_string().contains("install failed"));
    }
}
