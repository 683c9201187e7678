//! Error types for pool construction

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no API keys provided — the pool requires at least one")]
    NoKeys,
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
