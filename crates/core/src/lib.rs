//! Core types and shared functionality for the qbank offline engine.
//!
//! This crate provides:
//! - The durable cache store with SQLite backend
//! - Cache generation naming and the expected-store-set computation
//! - The daemon/page message protocol and page registry
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;

pub use cache::{CacheDb, StoreKind, StoredResponse};
pub use config::AppConfig;
pub use error::Error;
pub use protocol::{DaemonMessage, PageMessage};
pub use registry::{DaemonHandle, PageConnection, Registry};
