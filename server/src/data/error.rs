//! Error type for the storage layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// Backend could not be reached or refused the operation
    #[error("Backend {backend} is not available: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },
}
