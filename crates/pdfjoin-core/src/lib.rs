//! PDF merge and split operations
//!
//! Documents are loaded and rewritten with lopdf. qpdf handles the two
//! password edges: decrypting protected input and encrypting output.
//!
//! - [`PdfDocument`]: load, page selection, merging and serialization
//! - [`range`]: page range parsing and validation against a page count
//! - [`PdfCommand`]: one merge or split request, executed as a pure function

pub mod command;
pub mod document;
pub mod error;
mod merge;
mod outline;
pub mod range;
mod split;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use command::{
    CommandKind, CommandOptions, InputFile, OutputFile, PdfCommand, ProcessMetrics,
    ProcessResult,
};
pub use document::{EncryptionSupport, PdfDocument};
pub use error::PdfJoinError;
pub use range::{ranges_from_outline, validate_ranges, PageRange, RangeError, RangePolicy};
