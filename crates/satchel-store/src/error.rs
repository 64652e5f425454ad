use thiserror::Error;

/// Storage failures.
///
/// The request path treats every variant as a cache miss: storage trouble
/// must never surface as an error to whoever asked for a response.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Quota exceeded, or the backing storage has been disabled.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
