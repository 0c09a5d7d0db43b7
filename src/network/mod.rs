//! Network subsystem: TCP connection and PCM ingestion

pub mod connect;
pub mod ingest;

pub use connect::{connect_with_retry, RetryPolicy};
pub use ingest::{IngestConfig, NetworkIngest};
