//! Core traits for folio providers and stores.

mod embedder;
mod llm;
mod object_store;
mod providers;
mod similarity_index;
mod store;

pub use embedder::*;
pub use llm::*;
pub use object_store::*;
pub use providers::*;
pub use similarity_index::*;
pub use store::*;
