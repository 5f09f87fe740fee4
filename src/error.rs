use thiserror::Error;

/// Failure kinds of the stream and its setup.
///
/// End of stream is not represented here: `read` returns `Ok(0)`.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed invocation arguments (also `--help` / `--version` requests).
    #[error("invalid arguments: {0}")]
    Parse(#[from] clap::Error),

    /// Boot sector unreadable or invalid, or the device cannot be opened.
    #[error("volume read error: {0}")]
    VolumeRead(String),

    /// Catalog record, attribute, index entry or path target missing or malformed.
    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn metadata(msg: impl Into<String>) -> Self {
        Error::Metadata(msg.into())
    }

    pub(crate) fn volume(msg: impl Into<String>) -> Self {
        Error::VolumeRead(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
