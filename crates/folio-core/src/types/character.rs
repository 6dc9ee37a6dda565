//! Character, appearance profile and setting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::json_parser::lenient::{self, not_specified};
use crate::json_parser::{is_placeholder, NOT_SPECIFIED};

/// Role classification derived from appearance frequency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CharacterRole {
    Protagonist,
    Supporting,
    #[default]
    Minor,
    /// Appears in too few scenes to count as minor.
    Background,
}

/// How a character's profile was produced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProfileSource {
    #[default]
    Synthesized,
    /// Synthesis failed; built from the first mention's description.
    Fallback,
}

macro_rules! sentinel_struct {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(
                #[serde(default = "not_specified", deserialize_with = "lenient::string")]
                pub $field: String,
            )+
        }

        impl Default for $name {
            fn default() -> Self {
                Self { $($field: NOT_SPECIFIED.to_string()),+ }
            }
        }
    };
}

sentinel_struct!(
    /// Overall body shape.
    BuildProfile { height, body_type, weight }
);

sentinel_struct!(
    /// Face and eyes.
    FacialFeatures { face_shape, eye_color, eye_shape, nose, mouth, facial_hair }
);

sentinel_struct!(
    /// Hair.
    HairProfile { color, length, style, texture }
);

sentinel_struct!(
    /// Skin and heritage cues.
    SkinProfile { tone, complexion, ethnicity }
);

sentinel_struct!(
    /// Apparent age.
    AgeProfile { apparent_age, age_range }
);

sentinel_struct!(
    /// Typical dress.
    ClothingProfile { typical_attire, colors, accessories, style }
);

sentinel_struct!(
    /// Body language.
    PostureProfile { posture, gait, mannerisms }
);

sentinel_struct!(
    /// Voice and speech.
    VoiceProfile { tone, accent, speech_pattern }
);

/// Synthesized visual profile of one character.
///
/// Every attribute is present; unknown values hold the "not specified"
/// sentinel so consumers can treat the schema as total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppearanceProfile {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub build: BuildProfile,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub face: FacialFeatures,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub hair: HairProfile,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub skin: SkinProfile,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub age: AgeProfile,
    #[serde(default, deserialize_with = "lenient::list")]
    pub distinguishing_marks: Vec<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub clothing: ClothingProfile,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub posture: PostureProfile,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub voice: VoiceProfile,
    #[serde(default, deserialize_with = "lenient::list")]
    pub distinctive_features: Vec<String>,
    #[serde(default = "not_specified", deserialize_with = "lenient::string")]
    pub visual_summary: String,
    #[serde(default = "not_specified", deserialize_with = "lenient::string")]
    pub personality_summary: String,
}

impl Default for AppearanceProfile {
    fn default() -> Self {
        Self {
            build: BuildProfile::default(),
            face: FacialFeatures::default(),
            hair: HairProfile::default(),
            skin: SkinProfile::default(),
            age: AgeProfile::default(),
            distinguishing_marks: Vec::new(),
            clothing: ClothingProfile::default(),
            posture: PostureProfile::default(),
            voice: VoiceProfile::default(),
            distinctive_features: Vec::new(),
            visual_summary: NOT_SPECIFIED.to_string(),
            personality_summary: NOT_SPECIFIED.to_string(),
        }
    }
}

impl AppearanceProfile {
    /// Whether both narrative summaries were filled in.
    pub fn has_summaries(&self) -> bool {
        !is_placeholder(&self.visual_summary) && !is_placeholder(&self.personality_summary)
    }

    /// Key attributes as `(label, value)`, skipping unknown values.
    pub fn key_attributes(&self) -> Vec<(&'static str, &str)> {
        [
            ("height", self.build.height.as_str()),
            ("build", self.build.body_type.as_str()),
            ("age", self.age.apparent_age.as_str()),
            ("hair", self.hair.color.as_str()),
            ("hair style", self.hair.style.as_str()),
            ("eyes", self.face.eye_color.as_str()),
            ("skin", self.skin.tone.as_str()),
            ("ethnicity", self.skin.ethnicity.as_str()),
            ("clothing", self.clothing.typical_attire.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !is_placeholder(value))
        .collect()
    }
}

/// A deduplicated narrative identity within one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    /// Derived from (document, canonical name); see [`Character::derive_id`].
    pub id: String,
    pub document_id: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub role: CharacterRole,
    pub profile: AppearanceProfile,
    pub profile_source: ProfileSource,
    /// Why profile synthesis fell back, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_scene_id: Option<String>,
    pub first_scene_index: u32,
    pub mention_count: u32,
    pub scene_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Character {
    /// Stable id for a canonical name within a document.
    pub fn derive_id(document_id: &str, canonical_name: &str) -> String {
        derive_entity_id("chr", document_id, canonical_name)
    }
}

/// A recurring location derived from scene analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub id: String,
    pub document_id: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub scene_count: u32,
    pub first_scene_index: u32,
    pub created_at: DateTime<Utc>,
}

impl Setting {
    /// Stable id for a setting name within a document.
    pub fn derive_id(document_id: &str, name: &str) -> String {
        derive_entity_id("set", document_id, name)
    }
}

fn derive_entity_id(prefix: &str, document_id: &str, name: &str) -> String {
    let normalized = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}_{}", prefix, &digest[..24])
}
