//! Error types for clipforge-media.

use std::io;
use thiserror::Error;

/// Result type for clipforge-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for clipforge-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structurally invalid box data.
    #[error("malformed box at offset {offset}: {reason}")]
    MalformedBox { offset: u64, reason: String },

    /// Missing required atom in the container.
    #[error("missing required atom: {0}")]
    MissingAtom(&'static str),

    /// A box header or payload extends past the readable range.
    #[error("unexpected end of file at offset {0}")]
    UnexpectedEof(u64),

    /// Unsupported container feature.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The requested cut window contains no samples on any track.
    #[error("empty cut: no samples fall inside the requested window")]
    EmptyCut,
}

impl Error {
    /// Create a malformed-box error.
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedBox {
            offset,
            reason: reason.into(),
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
