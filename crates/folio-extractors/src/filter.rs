//! Front- and back-matter filtering.
//!
//! E-books carry copyright pages, tables of contents, acknowledgements and
//! "also by" lists alongside the story. These are dropped by title and
//! content heuristics before segmentation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Chapter;

/// Default minimum word count for a chapter to count as story text.
pub const DEFAULT_MIN_CHAPTER_WORDS: usize = 100;

static FRONT_MATTER_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:front matter|cover|title page|half title|copyright|contents|table of contents|dedication|epigraph|praise for\b.*|also by\b.*|other books by\b.*|map|maps|cast of characters|dramatis personae)\s*$",
    )
    .expect("static regex")
});

static BACK_MATTER_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:acknowledge?ments?|about the authors?|about the publisher|author'?s note|notes|endnotes|glossary|index|bibliography|colophon|newsletter|excerpt\b.*|reading group guide|copyright page)\s*$",
    )
    .expect("static regex")
});

static BOILERPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)all rights reserved|\bisbn\b|published by|printed in").expect("static regex"));

/// Why a chapter was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Title names a front-matter section.
    FrontMatter,
    /// Title names a back-matter section.
    BackMatter,
    /// Short text with publishing boilerplate.
    Boilerplate,
    /// Fewer words than the configured minimum.
    TooShort,
}

/// A chapter that did not survive filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedChapter {
    pub chapter: Chapter,
    pub reason: SkipReason,
}

/// Result of filtering: story chapters re-indexed in reading order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilteredChapters {
    pub kept: Vec<Chapter>,
    pub skipped: Vec<SkippedChapter>,
}

/// Heuristic chapter filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterFilter {
    /// Chapters below this word count are dropped.
    pub min_words: usize,
}

impl Default for ChapterFilter {
    fn default() -> Self {
        Self {
            min_words: DEFAULT_MIN_CHAPTER_WORDS,
        }
    }
}

impl ChapterFilter {
    /// Create a filter with a custom minimum word count.
    pub fn with_min_words(min_words: usize) -> Self {
        Self { min_words }
    }

    /// Classify a single chapter. `None` means it is story text.
    pub fn classify(&self, chapter: &Chapter) -> Option<SkipReason> {
        if FRONT_MATTER_TITLE_RE.is_match(&chapter.title) {
            return Some(SkipReason::FrontMatter);
        }
        if BACK_MATTER_TITLE_RE.is_match(&chapter.title) {
            return Some(SkipReason::BackMatter);
        }
        // Boilerplate only matters on short pages; a novel may say "published by" once.
        if chapter.word_count < self.min_words * 5 && BOILERPLATE_RE.is_match(&chapter.text) {
            return Some(SkipReason::Boilerplate);
        }
        if chapter.word_count < self.min_words {
            return Some(SkipReason::TooShort);
        }
        None
    }

    /// Split chapters into kept and skipped, re-indexing the kept ones from 0.
    pub fn apply(&self, chapters: Vec<Chapter>) -> FilteredChapters {
        let mut result = FilteredChapters::default();

        for mut chapter in chapters {
            match self.classify(&chapter) {
                Some(reason) => {
                    tracing::debug!(
                        title = %chapter.title,
                        words = chapter.word_count,
                        ?reason,
                        "Skipping non-story chapter"
                    );
                    result.skipped.push(SkippedChapter { chapter, reason });
                }
                None => {
                    chapter.index = result.kept.len();
                    result.kept.push(chapter);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_titles_filtered() {
        let filter = ChapterFilter::default();
        let copyright = Chapter::new(0, "Copyright", words(300));
        let thanks = Chapter::new(9, "Acknowledgments", words(300));
        let story = Chapter::new(1, "Chapter One", words(300));

        assert_eq!(filter.classify(&copyright), Some(SkipReason::FrontMatter));
        assert_eq!(filter.classify(&thanks), Some(SkipReason::BackMatter));
        assert_eq!(filter.classify(&story), None);
    }

    #[test]
    fn test_short_and_boilerplate() {
        let filter = ChapterFilter::default();
        let short = Chapter::new(0, "Chapter 1", words(20));
        let legal = Chapter::new(1, "Untitled", format!("{} All rights reserved.", words(150)));

        assert_eq!(filter.classify(&short), Some(SkipReason::TooShort));
        assert_eq!(filter.classify(&legal), Some(SkipReason::Boilerplate));
    }

    #[test]
    fn test_apply_reindexes_kept() {
        let filter = ChapterFilter::with_min_words(10);
        let chapters = vec![
            Chapter::new(0, "Contents", words(50)),
            Chapter::new(1, "Chapter 1", words(50)),
            Chapter::new(2, "Chapter 2", words(3)),
            Chapter::new(3, "Chapter 3", words(50)),
        ];

        let filtered = filter.apply(chapters);
        assert_eq!(filtered.kept.len(), 2);
        assert_eq!(filtered.skipped.len(), 2);
        assert_eq!(filtered.kept[0].index, 0);
        assert_eq!(filtered.kept[1].index, 1);
        assert_eq!(filtered.kept[1].source_index, 3);
    }
}
