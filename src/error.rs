//! Error taxonomy for thumbextract
//!
//! Variants mirror the semantic taxonomy from the design: every failure a
//! parser can surface to a caller is named here rather than left as a
//! stringly-typed catch-all. Unknown-but-well-framed boxes/tags are never an
//! error -- they're skipped by the parser that encounters them.

use std::fmt;

/// Result type for thumbextract operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while locating or extracting an embedded thumbnail
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The host reader returned fewer bytes than requested (including zero)
    #[error("truncated input at offset {offset}: requested {requested} bytes, got {got}")]
    TruncatedInput {
        offset: u64,
        requested: u32,
        got: usize,
    },

    /// The host reader's callback itself failed
    #[error("host read error: {0}")]
    Host(#[source] HostError),

    /// The container signature didn't match the expected format
    #[error("not a supported {0} file")]
    NotSupportedFormat(&'static str),

    /// An expected metadata box/segment was not found
    #[error("metadata missing: {0}")]
    MetadataMissing(&'static str),

    /// A requested thumbnail index is out of range
    #[error("thumbnail index {index} out of bounds (have {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A HEIF item type other than "jpeg"/"hvc1" was requested as a thumbnail
    #[error("unsupported HEIF item type: {0:?}")]
    UnsupportedItemType([u8; 4]),

    /// Self-inconsistent structure: bad sizes, implausible counts, dangling references
    #[error("corrupt structure: {0}")]
    CorruptStructure(String),
}

/// Opaque error from the host-supplied reader
///
/// Boxed so that `HostReader` implementations aren't tied to any particular
/// error type (an `io::Error` for a file, an HTTP client error for a
/// range-request backend, etc).
#[derive(Debug)]
pub struct HostError(pub Box<dyn std::error::Error + Send + Sync + 'static>);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl Error {
    /// Wrap an arbitrary host error
    pub fn host<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Host(HostError(Box::new(err)))
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptStructure(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::host(err)
    }
}
