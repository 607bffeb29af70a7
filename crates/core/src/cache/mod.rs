//! SQLite-backed durable cache for intercepted responses.
//!
//! This module provides the persistent store the cache daemon serves from,
//! using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Multiple named stores per cache generation, created lazily on first write
//! - Request identity via SHA-256 hashing of method + URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Oldest-first trimming for bounded stores

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::StoredResponse;
pub use stores::StoreKind;
