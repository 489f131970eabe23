//! Shared error type for the core crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("upstream client timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("upstream client error: {0}")]
    Upstream(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
