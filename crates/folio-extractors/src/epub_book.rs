//! EPUB chapter extraction.
//!
//! Spine items become chapters. The XHTML of each item is parsed with
//! `scraper`; block-level text becomes blank-line separated paragraphs so
//! the scene segmenter sees the same boundaries the typesetter did.

use std::io::Cursor;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::error::{ExtractError, ExtractResult};
use crate::types::{BookMetadata, Chapter, ExtractedBook, SourceFormat};
use crate::Extractor;

/// EPUB extractor backed by the `epub` crate.
///
/// The container is unzipped synchronously inside `spawn_blocking`.
#[derive(Debug, Clone, Default)]
pub struct EpubExtractor;

impl EpubExtractor {
    /// Create a new EPUB extractor.
    pub fn new() -> Self {
        Self
    }

    fn extract_sync(content: Vec<u8>) -> ExtractResult<ExtractedBook> {
        let cursor = Cursor::new(content);
        let mut doc = ::epub::doc::EpubDoc::from_reader(cursor)
            .map_err(|e| ExtractError::Epub(e.to_string()))?;

        let metadata = extract_metadata(&doc);

        let mut chapters = Vec::new();
        let num_chapters = doc.get_num_chapters();

        for spine_idx in 0..num_chapters {
            doc.set_current_chapter(spine_idx);

            let xhtml = match doc.get_current_str() {
                Some((content, _mime)) => content,
                None => continue,
            };

            if xhtml.trim().is_empty() {
                continue;
            }

            let html = Html::parse_document(&xhtml);
            let paragraphs = block_texts(&html);
            if paragraphs.is_empty() {
                continue;
            }

            let title = first_heading(&html).unwrap_or_else(|| format!("Chapter {}", spine_idx + 1));
            chapters.push(Chapter::new(spine_idx, title, paragraphs.join("\n\n")));
        }

        if chapters.is_empty() {
            return Err(ExtractError::EmptyContent);
        }

        Ok(ExtractedBook { metadata, chapters })
    }
}

#[async_trait]
impl Extractor for EpubExtractor {
    async fn extract(&self, content: &[u8]) -> ExtractResult<ExtractedBook> {
        let content = content.to_vec();
        tokio::task::spawn_blocking(move || Self::extract_sync(content)).await?
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Epub
    }

    fn name(&self) -> &str {
        "epub"
    }
}

fn extract_metadata(doc: &::epub::doc::EpubDoc<Cursor<Vec<u8>>>) -> BookMetadata {
    BookMetadata {
        title: doc.mdata("title").map(|m| m.value.clone()),
        author: doc.mdata("creator").map(|m| m.value.clone()),
        language: doc.mdata("language").map(|m| m.value.clone()),
        description: doc.mdata("description").map(|m| m.value.clone()),
    }
}

/// Block-level text in document order, headings excluded.
fn block_texts(html: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("p, blockquote, li, pre, div.text, div.body") else {
        return Vec::new();
    };

    html.select(&selector)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect()
}

/// The first h1/h2/h3 of a spine item.
fn first_heading(html: &Html) -> Option<String> {
    let selector = Selector::parse("h1, h2, h3").ok()?;
    html.select(&selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
