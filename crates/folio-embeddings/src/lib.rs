//! folio-embeddings - Embedding provider implementations for folio.
//!
//! # Supported Providers
//!
//! - **OpenAI** (feature: `openai`) - text-embedding-3-small, text-embedding-3-large, etc.
//! - **Ollama** - Local embedding models via `/api/embed`
//!
//! # Example
//!
//! ```ignore
//! use folio_embeddings::{EmbedderFactory, EmbedderProvider};
//!
//! let embedder = EmbedderFactory::for_caller(&resolver, "alice", EmbedderProvider::OpenAI, config).await?;
//! let vectors = embedder.embed_batch(&texts).await?;
//! ```

mod factory;
mod ollama;
mod openai;

pub use factory::EmbedderFactory;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

// Re-export core types for convenience
pub use folio_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};
