//! Scene segmentation.
//!
//! Chapter text is split into paragraphs on blank lines. Consecutive
//! dialogue paragraphs with the same inferred speaker form one scene; every
//! other paragraph is a scene of its own. Break markers (`* * *`, `---`)
//! are dropped and close any open dialogue group.

mod classify;
mod patterns;

pub use classify::{classify, dialogue_ratio, estimate_characters, has_dialogue, infer_speaker};

use folio_extractors::Chapter;

use crate::types::NewScene;
use patterns::{BREAK_MARKER_RE, PARAGRAPH_SPLIT_RE};

/// Splits chapters into ordered, classified scenes.
#[derive(Debug, Clone, Default)]
pub struct SceneSegmenter;

struct DialogueGroup {
    speaker: Option<String>,
    paragraphs: Vec<String>,
}

impl SceneSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Segment chapters in reading order.
    ///
    /// Global indices are assigned from a single counter starting at 0, so
    /// they are contiguous across chapters.
    pub fn segment(&self, chapters: &[Chapter]) -> Vec<NewScene> {
        let mut scenes = Vec::new();
        let mut next_global = 0u32;

        for (position, chapter) in chapters.iter().enumerate() {
            let chapter_scenes = self.segment_chapter(chapter, position as u32, &mut next_global);
            tracing::debug!(
                chapter = %chapter.title,
                scenes = chapter_scenes.len(),
                "Segmented chapter"
            );
            scenes.extend(chapter_scenes);
        }

        scenes
    }

    /// Segment one chapter, continuing the global counter.
    pub fn segment_chapter(
        &self,
        chapter: &Chapter,
        chapter_index: u32,
        next_global: &mut u32,
    ) -> Vec<NewScene> {
        let mut bodies: Vec<(String, Option<String>)> = Vec::new();
        let mut group: Option<DialogueGroup> = None;

        let text = chapter.text.replace("\r\n", "\n");
        for paragraph in PARAGRAPH_SPLIT_RE.split(&text) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            if BREAK_MARKER_RE.is_match(paragraph) {
                flush(&mut group, &mut bodies);
                continue;
            }

            if !has_dialogue(paragraph) {
                flush(&mut group, &mut bodies);
                bodies.push((paragraph.to_string(), None));
                continue;
            }

            let speaker = infer_speaker(paragraph);
            match group.as_mut() {
                Some(open) if open.speaker == speaker => {
                    open.paragraphs.push(paragraph.to_string());
                }
                _ => {
                    flush(&mut group, &mut bodies);
                    group = Some(DialogueGroup {
                        speaker,
                        paragraphs: vec![paragraph.to_string()],
                    });
                }
            }
        }
        flush(&mut group, &mut bodies);

        bodies
            .into_iter()
            .enumerate()
            .map(|(scene_index, (text, speaker))| {
                let dialogue = has_dialogue(&text);
                let scene = NewScene {
                    global_index: *next_global,
                    chapter_index,
                    chapter_title: chapter.title.clone(),
                    scene_index: scene_index as u32,
                    word_count: text.split_whitespace().count() as u32,
                    scene_type: classify(&text),
                    has_dialogue: dialogue,
                    estimated_characters: estimate_characters(&text, dialogue),
                    speaker,
                    text,
                };
                *next_global += 1;
                scene
            })
            .collect()
    }
}

fn flush(group: &mut Option<DialogueGroup>, bodies: &mut Vec<(String, Option<String>)>) {
    if let Some(done) = group.take() {
        bodies.push((done.paragraphs.join("\n\n"), done.speaker));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SceneType;

    fn chapter(index: usize, text: &str) -> Chapter {
        Chapter::new(index, format!("Chapter {}", index + 1), text)
    }

    #[test]
    fn test_same_speaker_dialogue_grouped() {
        let text = "\"We ride at dawn,\" Ned said.\n\n\"All of us,\" Ned said.\n\n\"Not me,\" said Arya.";
        let scenes = SceneSegmenter::new().segment(&[chapter(0, text)]);

        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].speaker.as_deref(), Some("Ned"));
        assert!(scenes[0].text.contains("All of us"));
        assert_eq!(scenes[1].speaker.as_deref(), Some("Arya"));
        assert!(scenes.iter().all(|s| s.has_dialogue));
    }

    #[test]
    fn test_narrative_paragraphs_stand_alone() {
        let text = "The snow fell.\n\nThe wolves howled.\n\n\nThe gate creaked open.";
        let scenes = SceneSegmenter::new().segment(&[chapter(0, text)]);
        assert_eq!(scenes.len(), 3);
        assert!(scenes.iter().all(|s| !s.has_dialogue));
    }

    #[test]
    fn test_break_marker_discarded_and_closes_group() {
        let text = "\"Stay,\" Ned said.\n\n* * *\n\n\"Stay,\" Ned said.";
        let scenes = SceneSegmenter::new().segment(&[chapter(0, text)]);
        assert_eq!(scenes.len(), 2);
        assert!(scenes.iter().all(|s| !s.text.contains('*')));
    }

    #[test]
    fn test_global_indices_contiguous_across_chapters() {
        let chapters = vec![
            chapter(0, "One.\n\nTwo.\n\nThree."),
            chapter(1, "Four.\n\n---\n\nFive."),
        ];
        let scenes = SceneSegmenter::new().segment(&chapters);

        let globals: Vec<u32> = scenes.iter().map(|s| s.global_index).collect();
        assert_eq!(globals, vec![0, 1, 2, 3, 4]);
        assert_eq!(scenes[3].chapter_index, 1);
        assert_eq!(scenes[3].scene_index, 0);
        assert_eq!(scenes[4].scene_index, 1);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let text = "Later, the riders came.\n\n\"Who goes?\" shouted Jory.\n\n\"Friends,\" Jory said.\n\nThe hall was vast and dark.";
        let chapters = vec![chapter(0, text)];
        let first = SceneSegmenter::new().segment(&chapters);
        let second = SceneSegmenter::new().segment(&chapters);
        assert_eq!(first, second);
        assert_eq!(first[0].scene_type, SceneType::Transition);
    }

    #[test]
    fn test_empty_chapter_has_no_scenes() {
        let scenes = SceneSegmenter::new().segment(&[chapter(0, "   \n\n***\n\n")]);
        assert!(scenes.is_empty());
    }
}
