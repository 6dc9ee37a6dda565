//! Core types for chapter extraction.

use serde::{Deserialize, Serialize};

/// Format of an uploaded source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// EPUB container (zip of XHTML spine items).
    #[default]
    Epub,
    /// UTF-8 plain text with "Chapter N" style headings.
    PlainText,
}

impl SourceFormat {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Epub => "epub",
            SourceFormat::PlainText => "plain_text",
        }
    }

    /// Parse a stored format tag.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "epub" => Some(SourceFormat::Epub),
            "plain_text" | "text" | "txt" => Some(SourceFormat::PlainText),
            _ => None,
        }
    }

    /// Detect the format from a file name.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".epub") {
            Some(SourceFormat::Epub)
        } else if lower.ends_with(".txt") || lower.ends_with(".text") || lower.ends_with(".md") {
            Some(SourceFormat::PlainText)
        } else {
            None
        }
    }

    /// Detect the format from a MIME type.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let mime = mime_type.to_lowercase();
        if mime.contains("application/epub") {
            Some(SourceFormat::Epub)
        } else if mime.contains("text/plain") || mime.contains("text/markdown") {
            Some(SourceFormat::PlainText)
        } else {
            None
        }
    }
}

/// Bibliographic metadata read from the container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One chapter of plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Reading-order position among the chapters that survived filtering.
    pub index: usize,
    /// Position in the source (spine item or heading order).
    pub source_index: usize,
    /// Chapter heading.
    pub title: String,
    /// Paragraphs separated by blank lines.
    pub text: String,
    /// Whitespace-delimited word count.
    pub word_count: usize,
}

impl Chapter {
    /// Create a chapter, counting its words.
    pub fn new(source_index: usize, title: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            index: source_index,
            source_index,
            title: title.into(),
            text,
            word_count,
        }
    }
}

/// Output of an extractor: metadata plus every chapter in source order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedBook {
    pub metadata: BookMetadata,
    pub chapters: Vec<Chapter>,
}

impl ExtractedBook {
    /// Total words over all chapters.
    pub fn word_count(&self) -> usize {
        self.chapters.iter().map(|c| c.word_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(SourceFormat::from_path("Book.EPUB"), Some(SourceFormat::Epub));
        assert_eq!(SourceFormat::from_path("notes.txt"), Some(SourceFormat::PlainText));
        assert_eq!(SourceFormat::from_path("scan.pdf"), None);
        assert_eq!(
            SourceFormat::from_mime("application/epub+zip"),
            Some(SourceFormat::Epub)
        );
        assert_eq!(SourceFormat::parse("plain_text"), Some(SourceFormat::PlainText));
    }

    #[test]
    fn test_chapter_word_count() {
        let chapter = Chapter::new(2, "Two", "It was a dark\n\nand stormy night.");
        assert_eq!(chapter.word_count, 7);
        assert_eq!(chapter.index, 2);
    }
}
