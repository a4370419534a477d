use thiserror::Error;

/// Failures raised by the key-value store or by the fan-out around it.
///
/// A missing key is never one of these; lookups report absence through
/// `None`, empty collections or zero-valued results.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Raised by the in-memory test store.
    #[cfg(test)]
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("discipline lookup task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
