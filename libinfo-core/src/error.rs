use crate::format::Format;
use thiserror::Error;

/// Everything that can go wrong while opening or querying a binary.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be opened, or a read at a validated offset failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// None of the format detectors matched.
    #[error("Unsupported binary format")]
    UnsupportedFormat,

    /// The format was recognised but cannot be loaded on this host.
    #[error("Not native format: {format} ({reason})")]
    NotNativeFormat {
        format: Format,
        reason: &'static str,
    },

    /// Offsets, counts or string references that do not fit inside the file.
    #[error("Malformed binary: {0}")]
    MalformedBinary(String),

    /// A section requested by name does not exist.
    #[error("Section not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedBinary(msg.into())
    }
}
