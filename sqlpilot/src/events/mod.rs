//! Supervisor events.
//!
//! The supervisor reports what it does to an [`EventSink`] handed to it at
//! construction. Event names are listed in [`event_types`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Names of the events the supervisor emits.
pub mod event_types {
    /// A run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A run reached `completed`.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A run ended in error recovery.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// An agent was called.
    pub const AGENT_INVOKED: &str = "agent.invoked";
    /// An agent returned a delta.
    pub const AGENT_SUCCEEDED: &str = "agent.succeeded";
    /// An agent failed, timed out or panicked.
    pub const AGENT_FAILED: &str = "agent.failed";
    /// The stage changed.
    pub const STAGE_TRANSITION: &str = "stage.transition";
    /// A stage proposed by an agent was overridden.
    pub const STAGE_CLAMPED: &str = "stage.clamped";
}
