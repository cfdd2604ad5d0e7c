//! Errors surfaced by the binary. Library operations report through
//! [`BackendError`] and the fetch/stream outcome enums instead.

use thiserror::Error;

use crate::backend::BackendError;
use crate::graph::ViewportBounds;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error(
        "viewport bounds must be finite: x [{}, {}] y [{}, {}]",
        .0.min_x, .0.max_x, .0.min_y, .0.max_y
    )]
    InvalidBounds(ViewportBounds),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
