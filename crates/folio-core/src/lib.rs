//! folio-core - Core library for folio.
//!
//! This crate provides the data model, provider traits, scene segmenter,
//! character discovery engine, similarity index, SQLite store and the job
//! queue orchestrator that turns an uploaded e-book into analyzed scenes
//! and character profiles.
//!
//! # Example
//!
//! ```ignore
//! use folio_core::{FolioConfig, IngestRequest, Orchestrator, WorkerPool};
//!
//! let orchestrator = Arc::new(Orchestrator::with_sqlite(FolioConfig::from_env()?, providers)?);
//! let workers = WorkerPool::start(orchestrator.clone()).await?;
//!
//! let outcome = orchestrator
//!     .ingest(IngestRequest::new("alice", "dune.epub", bytes))
//!     .await?;
//! let mut events = orchestrator.events().subscribe();
//! while let Some(event) = events.recv_for(&outcome.document().id).await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod characters;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod json_parser;
pub mod pipeline;
pub mod prompts;
pub mod segmenter;
pub mod similarity;
pub mod storage;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::FolioConfig;
pub use credentials::{EnvCredentialResolver, StaticCredentialResolver};
pub use error::{ErrorCode, FolioError, FolioResult};
pub use events::{EventBus, EventSubscriber, PipelineEvent};
pub use pipeline::{
    IngestOutcome, IngestRequest, Orchestrator, SimilarCharacter, StageHandler, WorkerPool,
};
pub use segmenter::SceneSegmenter;
pub use storage::LocalFsStore;
pub use store::SqliteStore;
pub use traits::{
    CredentialResolver, Embedder, EmbedderConfig, Llm, LlmConfig, ObjectStore, ProviderCredential,
    ProviderFactory, ProviderRequest, SimilarityIndex,
};
pub use types::{
    AnalysisStatus, Character, CharacterRole, Document, DocumentStatus, Scene, SceneAnalysis,
    Setting, Stage, StagePayload,
};

pub use folio_extractors::{Chapter, SourceFormat};
