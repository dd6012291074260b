//! Centralized error handling for scenepack.
//!
//! All failure conditions are propagated through the [`Result`] type; the
//! crate enforces this with `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]`.
//!
//! ## Error Categories
//!
//! - **I/O Errors** ([`PackError::Io`]): low-level file system operations
//! - **Framing Errors** ([`PackError::TruncatedChunk`]): a chunk declared
//!   more bytes than the stream could provide
//! - **Container Errors** ([`PackError::CorruptContainer`]): structural
//!   violations of the container format (length mismatches, bad counts)
//! - **Schema Errors** ([`PackError::Schema`]): descriptor metadata that
//!   cannot be encoded or decoded
//! - **Internal Errors** ([`PackError::Internal`]): logic errors that
//!   indicate a bug in the library
//!
//! The type is `Clone` so errors can be stored for later analysis; I/O
//! errors are wrapped in `Arc` to keep cloning cheap.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for scenepack operations.
pub type Result<T> = std::result::Result<T, PackError>;

/// The master error enum covering all failure domains in scenepack.
#[derive(Debug, Clone)]
pub enum PackError {
    /// Low-level I/O failure (disk full, permissions, truncated file, etc.).
    ///
    /// The underlying `io::Error` is wrapped in an `Arc` to make the error
    /// `Clone`.
    Io(Arc<io::Error>),

    /// A chunk's length prefix promised more bytes than the stream held.
    ///
    /// Fatal for the current block; callers should abort loading rather
    /// than guess at a resynchronization point.
    TruncatedChunk {
        /// Bytes the length prefix declared.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The container is structurally invalid.
    ///
    /// Raised when a chunk's declared length disagrees with the bytes a
    /// block parser actually consumed, when a block's declared object
    /// count does not match the records present, or when a record frame
    /// is self-contradictory. Continuing past any of these risks reading
    /// the next block's bytes as if they belonged to the current one.
    CorruptContainer(String),

    /// Schema metadata (field or collection descriptors) failed to encode
    /// or decode.
    Schema(String),

    /// The per-session reference ID generator exhausted its retry budget.
    ///
    /// Practically unreachable with a 32-bit ID space and realistic graph
    /// sizes; surfaced as an error instead of recursing unboundedly.
    IdSpaceExhausted,

    /// Logic error in the library (should not occur in production; please
    /// report as a bug).
    Internal(String),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::TruncatedChunk { expected, actual } => {
                write!(f, "Truncated Chunk: expected {expected} bytes, got {actual}")
            }
            Self::CorruptContainer(s) => write!(f, "Corrupt Container: {s}"),
            Self::Schema(s) => write!(f, "Schema Error: {s}"),
            Self::IdSpaceExhausted => write!(f, "Reference ID space exhausted"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PackError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
