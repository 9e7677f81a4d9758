use thiserror::Error;

use crate::range::RangeError;

#[derive(Error, Debug)]
pub enum PdfJoinError {
    /// Covers unreadable bytes as well as password failures
    #[error("Invalid or password-protected PDF: {name}")]
    InvalidOrProtected { name: String },

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("Document has no bookmarks to split on")]
    NoBookmarks,

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PdfJoinError {
    /// True when the error was caused by the caller's input rather than an
    /// engine failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PdfJoinError::InvalidOrProtected { .. }
                | PdfJoinError::Range(_)
                | PdfJoinError::InvalidRange(_)
                | PdfJoinError::NoBookmarks
        )
    }

    pub(crate) fn protected(name: impl Into<String>) -> Self {
        PdfJoinError::InvalidOrProtected { name: name.into() }
    }
}
