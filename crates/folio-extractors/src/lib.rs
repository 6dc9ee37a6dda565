//! folio-extractors - Chapter extraction from e-books.
//!
//! Turns an uploaded source document into an ordered list of chapters
//! (title, plain text, word count) and drops front/back matter with title
//! and content heuristics.
//!
//! # Example
//!
//! ```ignore
//! use folio_extractors::{ChapterFilter, ExtractorFactory, SourceFormat};
//!
//! let extractor = ExtractorFactory::for_format(SourceFormat::Epub);
//! let book = extractor.extract(&epub_bytes).await?;
//! let chapters = ChapterFilter::default().apply(book.chapters).kept;
//! ```

mod epub_book;
mod error;
mod factory;
mod filter;
mod text;
mod types;

pub use epub_book::EpubExtractor;
pub use error::{ExtractError, ExtractResult};
pub use factory::ExtractorFactory;
pub use filter::{ChapterFilter, FilteredChapters, SkipReason, SkippedChapter, DEFAULT_MIN_CHAPTER_WORDS};
pub use text::PlainTextExtractor;
pub use types::{BookMetadata, Chapter, ExtractedBook, SourceFormat};

use async_trait::async_trait;

/// Core Extractor trait - every source format implements this.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract metadata and chapters from raw bytes.
    async fn extract(&self, content: &[u8]) -> ExtractResult<ExtractedBook>;

    /// The format this extractor handles.
    fn format(&self) -> SourceFormat;

    /// Human-readable name for this extractor.
    fn name(&self) -> &str;
}
