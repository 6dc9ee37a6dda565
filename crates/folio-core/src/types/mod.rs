//! Core types for folio.

mod analysis;
mod character;
mod document;
mod embedding;
mod job;
mod scene;

pub use analysis::{CharacterSighting, SceneAnalysis};
pub use character::{
    AgeProfile, AppearanceProfile, BuildProfile, Character, CharacterRole, ClothingProfile,
    FacialFeatures, HairProfile, PostureProfile, ProfileSource, Setting, SkinProfile,
    VoiceProfile,
};
pub use document::{Document, DocumentStatus, NewDocument};
pub use embedding::{EmbeddingRecord, EntityKind, SimilarityMatch, SimilarityQuery};
pub use job::{EnqueueOutcome, JobRecord, JobStatus, Stage, StagePayload};
pub use scene::{AnalysisCounts, AnalysisStatus, NewScene, Scene, SceneAnalysisUpdate, SceneType};
