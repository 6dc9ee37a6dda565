//! Pipeline events.
//!
//! - Event types for progress, status changes, stage errors and completion
//! - Event bus for in-process pub/sub

mod bus;
mod event;

pub use bus::{EventBus, EventSubscriber};
pub use event::{
    PipelineEvent, ProgressEvent, StageCompletedEvent, StageErrorEvent, StatusChangedEvent,
};
