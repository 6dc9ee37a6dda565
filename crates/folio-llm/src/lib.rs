//! folio-llm - LLM provider implementations for folio.
//!
//! # Supported Providers
//!
//! - **OpenAI** (feature: `openai`) - GPT-4o and the o-series
//! - **Anthropic** - Claude 3.5 and later, over the Messages API
//! - **Ollama** - Local models, no credential required
//!
//! # Example
//!
//! ```ignore
//! use folio_llm::{LlmFactory, LlmProvider};
//!
//! let llm = LlmFactory::for_caller(&resolver, "alice", LlmProvider::OpenAI, config).await?;
//! let analysis = llm.analyze_scene(&scene.text, Some(&scene.chapter_title)).await?;
//! ```

mod anthropic;
mod factory;
mod http;
mod ollama;
mod openai;

pub use anthropic::AnthropicLlm;
pub use factory::LlmFactory;
pub use ollama::OllamaLlm;
pub use openai::OpenAIProvider;

// Re-export core types for convenience
pub use folio_core::traits::{GenerationOptions, Llm, LlmConfig, LlmProvider, ResponseFormat};
