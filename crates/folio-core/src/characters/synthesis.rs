//! Character profile synthesis.

use std::sync::Arc;

use tracing::{debug, warn};

use super::mention::CharacterGroup;
use crate::config::SynthesisConfig;
use crate::error::{ErrorCode, FolioError, FolioResult};
use crate::json_parser;
use crate::prompts;
use crate::traits::{GenerationOptions, Llm};
use crate::types::{AppearanceProfile, ProfileSource};

/// A profile and how it was obtained.
#[derive(Debug, Clone)]
pub struct SynthesizedProfile {
    pub profile: AppearanceProfile,
    pub source: ProfileSource,
    /// Why synthesis fell back, if it did.
    pub error: Option<String>,
}

/// Merges all mentions of one character into a single profile.
pub struct ProfileSynthesizer {
    llm: Arc<dyn Llm>,
    config: SynthesisConfig,
}

impl ProfileSynthesizer {
    pub fn new(llm: Arc<dyn Llm>, config: SynthesisConfig) -> Self {
        Self { llm, config }
    }

    /// Synthesize a profile with one LLM call.
    ///
    /// Parse failures and responses without both summaries fall back to a
    /// profile built from the first mention. Credential, rate-limit and
    /// connectivity errors are returned for the stage to handle.
    pub async fn synthesize(&self, group: &CharacterGroup) -> FolioResult<SynthesizedProfile> {
        match self.synthesize_strict(group).await {
            Ok(profile) => {
                debug!(character = %group.canonical_name, "Synthesized profile");
                Ok(SynthesizedProfile {
                    profile,
                    source: ProfileSource::Synthesized,
                    error: None,
                })
            }
            Err(e) if e.is_item_level() => {
                warn!(
                    character = %group.canonical_name,
                    error = %e,
                    "Profile synthesis failed, using fallback profile"
                );
                Ok(SynthesizedProfile {
                    profile: fallback_profile(group),
                    source: ProfileSource::Fallback,
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn synthesize_strict(&self, group: &CharacterGroup) -> FolioResult<AppearanceProfile> {
        let mentions = group.representative_descriptions(self.config.max_mentions);
        let prompt = prompts::profile_synthesis_prompt(&group.canonical_name, &group.aliases, &mentions);
        let options = GenerationOptions::json()
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let raw = self.llm.generate(&prompt, &options).await?;
        let profile: AppearanceProfile = json_parser::parse_typed(&raw)?;

        if !profile.has_summaries() {
            return Err(FolioError::Parse {
                message: "Profile is missing visual or personality summary".to_string(),
                code: ErrorCode::ParseMissingField,
            });
        }
        Ok(profile)
    }
}

/// Minimal profile from the first mention's raw description.
pub fn fallback_profile(group: &CharacterGroup) -> AppearanceProfile {
    let mut profile = AppearanceProfile::default();
    if let Some(first) = group.mentions.iter().find(|m| m.has_description()) {
        profile.visual_summary = first.description.clone();
    } else if let Some(first) = group.first_mention() {
        profile.visual_summary = format!("{} as first seen in {}.", group.canonical_name, first.chapter_title);
    }
    profile
}
