//! folio-worker - runs the folio pipeline as a long-lived process.
//!
//! The binary opens the configured SQLite database, starts one worker pool
//! per stage and optionally ingests files named on the command line.
//!
//! ```text
//! FOLIO_OWNER_ID=alice OPENAI_API_KEY=sk-... folio-worker books/dune.epub
//! ```

pub mod factory;

pub use factory::{create_orchestrator, load_config, ConfiguredProviders};
