//! Request identity hashing for cache keys.

use sha2::{Digest, Sha256};

/// Compute the cache key identifying a request within a store.
///
/// Only GET requests are ever cached, but the method is hashed in so a
/// key can never collide across methods.
pub fn request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
