//! Factory for creating extractors.

use std::sync::Arc;

use crate::epub_book::EpubExtractor;
use crate::error::{ExtractError, ExtractResult};
use crate::text::PlainTextExtractor;
use crate::types::SourceFormat;
use crate::Extractor;

/// Factory for creating chapter extractors.
pub struct ExtractorFactory;

impl ExtractorFactory {
    /// Create an EPUB extractor.
    pub fn epub() -> Arc<dyn Extractor> {
        Arc::new(EpubExtractor::new())
    }

    /// Create a plain-text extractor.
    pub fn plain_text() -> Arc<dyn Extractor> {
        Arc::new(PlainTextExtractor::new())
    }

    /// Create the extractor for a source format.
    pub fn for_format(format: SourceFormat) -> Arc<dyn Extractor> {
        match format {
            SourceFormat::Epub => Self::epub(),
            SourceFormat::PlainText => Self::plain_text(),
        }
    }

    /// Create the extractor for a MIME type.
    pub fn for_mime_type(mime_type: &str) -> ExtractResult<Arc<dyn Extractor>> {
        SourceFormat::from_mime(mime_type)
            .map(Self::for_format)
            .ok_or_else(|| ExtractError::UnsupportedFormat(mime_type.to_string()))
    }
}
