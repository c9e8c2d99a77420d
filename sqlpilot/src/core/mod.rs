//! Core domain types: pipeline stages and run outcomes.

mod outcome;
mod stage;

pub use outcome::{Diagnostics, PipelineOutcome, QueryAnswer, ERROR_STAGE};
pub use stage::{PipelineStage, StageProposal};
