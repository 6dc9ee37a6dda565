//! Extraction error types.

use thiserror::Error;

/// Errors that can occur during chapter extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Source format is not supported by any extractor.
    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(String),

    /// Extraction process failed.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// The document yielded no readable chapters.
    #[error("No readable chapters in document")]
    EmptyContent,

    /// IO error during extraction.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// EPUB container or spine could not be read.
    #[error("EPUB extraction error: {0}")]
    Epub(String),

    /// Task join error from spawn_blocking.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;
