//! Errors raised by the grid builder and the heatmap renderer.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GridError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// The requested window ends before it starts.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// The window reaches past the dates the calendar can represent.
    #[error("date window out of range: {0}")]
    OutOfRange(String),

    /// The canvas could not be allocated or the PNG could not be encoded.
    #[error("heatmap rendering failed: {0}")]
    RenderFailure(String),
}

impl From<std::convert::Infallible> for GridError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
