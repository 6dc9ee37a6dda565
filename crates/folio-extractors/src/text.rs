//! Plain-text chapter extraction.
//!
//! Chapters start at heading lines such as `Chapter 12`, `CHAPTER IV`,
//! `Part Two` or `Prologue`. Text before the first heading becomes a
//! chapter of its own so the front-matter filter can decide on it.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ExtractError, ExtractResult};
use crate::types::{BookMetadata, Chapter, ExtractedBook, SourceFormat};
use crate::Extractor;

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:(?:chapter|part|book)[ \t]+(?:\d+|[ivxlcdm]+|(?:one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty|thirty|forty|fifty)(?:-[a-z]+)?)\b[^\n]{0,80}|prologue|epilogue|interlude)[ \t]*$",
    )
    .expect("static regex")
});

/// Plain-text extractor.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    /// Create a new plain-text extractor.
    pub fn new() -> Self {
        Self
    }

    /// Split text into chapters at heading lines.
    pub fn split_chapters(text: &str) -> Vec<Chapter> {
        let text = text.replace("\r\n", "\n");
        let headings: Vec<_> = HEADING_RE.find_iter(&text).collect();

        let mut chapters = Vec::new();

        if headings.is_empty() {
            let body = text.trim();
            if !body.is_empty() {
                chapters.push(Chapter::new(0, "Chapter 1", body));
            }
            return chapters;
        }

        let preamble = text[..headings[0].start()].trim();
        if !preamble.is_empty() {
            chapters.push(Chapter::new(chapters.len(), "Front Matter", preamble));
        }

        for (i, heading) in headings.iter().enumerate() {
            let end = headings
                .get(i + 1)
                .map(|next| next.start())
                .unwrap_or(text.len());
            let body = text[heading.end()..end].trim();
            if body.is_empty() {
                continue;
            }
            chapters.push(Chapter::new(chapters.len(), heading.as_str().trim(), body));
        }

        chapters
    }
}

#[async_trait]
impl Extractor for PlainTextExtractor {
    async fn extract(&self, content: &[u8]) -> ExtractResult<ExtractedBook> {
        let text = std::str::from_utf8(content)
            .map_err(|e| ExtractError::ExtractionFailed(format!("Source is not UTF-8: {}", e)))?;

        let chapters = Self::split_chapters(text);
        if chapters.is_empty() {
            return Err(ExtractError::EmptyContent);
        }

        Ok(ExtractedBook {
            metadata: BookMetadata::default(),
            chapters,
        })
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::PlainText
    }

    fn name(&self) -> &str {
        "plain_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_chapter_headings() {
        let text = "Copyright 2024\n\nChapter 1\n\nIt began.\n\nCHAPTER II: The Road\n\nIt went on.\n";
        let chapters = PlainTextExtractor::split_chapters(text);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "Front Matter");
        assert_eq!(chapters[1].title, "Chapter 1");
        assert_eq!(chapters[1].text, "It began.");
        assert_eq!(chapters[2].title, "CHAPTER II: The Road");
        assert_eq!(chapters[2].source_index, 2);
    }

    #[test]
    fn test_no_headings_single_chapter() {
        let chapters = PlainTextExtractor::split_chapters("Just one\n\nlong story.");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].word_count, 4);
    }

    #[test]
    fn test_empty_text_is_error() {
        let result = tokio_test::block_on(PlainTextExtractor::new().extract(b"   \n "));
        assert!(matches!(result, Err(ExtractError::EmptyContent)));
    }
}
