//! The document pipeline: stage handlers, durable queues and the
//! orchestrator that drives the state machine.

mod analysis;
mod discovery;
mod orchestrator;
mod progress;
mod queue;
mod segmentation;
mod stage;
mod worker;

pub use analysis::AnalysisStage;
pub use discovery::DiscoveryStage;
pub use orchestrator::{IngestOutcome, IngestRequest, Orchestrator, SimilarCharacter};
pub use progress::{Milestones, ProgressReporter};
pub use queue::JobQueue;
pub use segmentation::SegmentationStage;
pub use stage::{StageContext, StageHandler, StageOutcome};
pub use worker::WorkerPool;
