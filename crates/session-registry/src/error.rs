//! Registry error types

use thiserror::Error;

/// Why an admission was refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmitError {
    #[error("session not found")]
    NotFound,

    #[error("session has expired")]
    Expired,

    #[error("session is full")]
    Full,
}
