//! Worker agents.
//!
//! Each agent owns one pipeline stage. It reads the shared
//! [`PipelineState`], does its work, and answers with a [`StateDelta`] that
//! the supervisor merges. Agents never mutate the state themselves.

pub mod analysis;
mod chart;
mod executor;
mod formatting;
mod generator;
pub mod ports;
mod sample;
mod schema;
mod validator;

use crate::errors::AgentError;
use crate::state::{PipelineState, StateDelta, UserContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

pub use analysis::KeywordQueryAnalyzer;
pub use chart::{wants_chart, ChartAgent};
pub use executor::{looks_malformed, SqlExecutorAgent};
pub use formatting::{execution_suggestions, format_rows, performance_rating, ResultFormat};
pub use generator::{extract_sql, SqlGeneratorAgent};
pub use ports::{
    QueryAnalyzer, QueryExecutor, QueryResult, SampleRetriever, SchemaRetriever, ValueMappings,
};
pub use sample::SampleRetrievalAgent;
pub use schema::{missing_entities, SchemaAgent};
pub use validator::SqlValidatorAgent;

/// Identifies a worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Schema analysis.
    Schema,
    /// Reference sample lookup.
    SampleRetrieval,
    /// SQL generation.
    SqlGenerator,
    /// SQL validation.
    SqlValidator,
    /// SQL execution.
    SqlExecutor,
    /// Chart building.
    Chart,
}

impl AgentKind {
    /// Returns the agent name used in messages, errors and events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Schema => "schema_agent",
            Self::SampleRetrieval => "sample_retrieval_agent",
            Self::SqlGenerator => "sql_generator_agent",
            Self::SqlValidator => "sql_validator_agent",
            Self::SqlExecutor => "sql_executor_agent",
            Self::Chart => "chart_generator_agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage worker.
#[async_trait]
pub trait WorkerAgent: Send + Sync + Debug {
    /// Returns which agent this is.
    fn kind(&self) -> AgentKind;

    /// Runs the agent against a read-only view of the state.
    ///
    /// # Arguments
    ///
    /// * `request` - The supervisor's instruction for this step
    /// * `state` - The current pipeline state
    /// * `ctx` - The caller's connection and identity
    ///
    /// # Returns
    ///
    /// The delta to merge, or the failure the supervisor should record.
    async fn invoke(
        &self,
        request: &str,
        state: &PipelineState,
        ctx: &UserContext,
    ) -> Result<StateDelta, AgentError>;
}
