//! Shared pipeline state and the delta merge protocol.
//!
//! Agents never mutate [`PipelineState`] directly. They return a
//! [`StateDelta`], and the supervisor folds it in with
//! [`PipelineState::apply`]:
//!
//! - conversation, query analysis, schema snapshots, SQL candidates,
//!   validation and execution records and error history only ever grow;
//! - stage, retry counter, retry budget, samples and chart are replaced;
//! - a delta that names an unknown stage, breaks the routing table or
//!   lowers the retry counter is rejected whole.

mod context;
mod delta;
mod pipeline_state;
pub mod records;


pub use context::UserContext;
pub use delta::StateDelta;
pub use pipeline_state::{PipelineState, SqlVerdict};
pub use records::{
    ChartArtifact, ColumnInfo, ErrorRecord, ExecutionRecord, Message, QueryAnalysis, QuerySample,
    Relationship, SampleRetrievalResult, SchemaInfo, TableInfo, ValidationKind, ValidationRecord,
};
