//! Crate-level error type.

use thiserror::Error;

use crate::device_link::LinkError;

#[derive(Error, Debug)]
pub enum Error {
    /// Device-link failure
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Bad or missing daemon configuration
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
