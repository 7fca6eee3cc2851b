//! Quoting error types.

use thiserror::Error;

use kq_core::CoreError;

#[derive(Debug, Error)]
pub enum QuotingError {
    /// Unrecognised quoting mode: quote computation cannot pick a pricing strategy.
    #[error("Invalid quoting mode: {0}")]
    InvalidMode(String),

    #[error("Invalid quoting parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type QuotingResult<T> = Result<T, QuotingError>;
