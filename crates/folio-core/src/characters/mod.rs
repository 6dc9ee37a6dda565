//! Character extraction, deduplication and profile synthesis.
//!
//! Phase 0 reads mentions out of completed scene analyses, Phase 1 groups
//! them by exact name, Phase 2 merges groups the LLM confidently identifies
//! as the same person. Each surviving group is then synthesized into one
//! appearance profile.

mod dedup;
mod mention;
mod roles;
mod settings;
mod synthesis;

pub use dedup::{
    group_name_similarity, name_similarity, AmbiguousPair, CharacterDeduplicator, DedupOutcome,
    MergeRecord, MergeVerdict,
};
pub use mention::{extract_mentions, group_exact, normalize_name, CharacterGroup, CharacterMention};
pub use roles::classify_role;
pub use settings::derive_settings;
pub use synthesis::{fallback_profile, ProfileSynthesizer, SynthesizedProfile};
