//! Render error taxonomy

use crate::decoder::DecodeError;
use stave_cache::DocumentId;

/// Errors surfaced to callers of the render engine
///
/// `Clone` because one failed job resolves every caller that was waiting on
/// it with the same error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// The page could not be decoded (corrupt data, unsupported feature)
    #[error("decode failed: {0}")]
    Decode(String),

    /// The render job exceeded its time budget
    #[error("render timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Page number outside `[1, page_count]`
    #[error("page {page} out of range (page_count={page_count})")]
    OutOfRange { page: u32, page_count: u32 },

    /// The job was dropped because its document was invalidated
    #[error("render cancelled")]
    Cancelled,

    /// The document is not open
    #[error("document {0} is not open")]
    UnknownDocument(DocumentId),

    /// Scale is not a finite number greater than zero
    #[error("invalid scale {0}")]
    InvalidScale(f32),

    /// The render task panicked or was aborted
    #[error("render worker failed: {0}")]
    Worker(String),
}

impl RenderError {
    /// Whether the caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenderError::Timeout { .. })
    }
}

impl From<DecodeError> for RenderError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownDocument(id) => RenderError::UnknownDocument(id),
            DecodeError::PageOutOfRange { page, page_count } => {
                RenderError::OutOfRange { page, page_count }
            }
            other => RenderError::Decode(other.to_string()),
        }
    }
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;
