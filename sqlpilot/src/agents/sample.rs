//! Sample retrieval agent.

use super::ports::SampleRetriever;
use super::{AgentKind, WorkerAgent};
use crate::errors::AgentError;
use crate::state::{Message, PipelineState, SampleRetrievalResult, StateDelta, UserContext};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Default number of samples requested.
pub const DEFAULT_SAMPLE_LIMIT: usize = 3;

/// Fetches reference question/SQL pairs for the generator.
pub struct SampleRetrievalAgent {
    retriever: Arc<dyn SampleRetriever>,
    limit: usize,
}

impl fmt::Debug for SampleRetrievalAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleRetrievalAgent")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl SampleRetrievalAgent {
    /// Creates the agent.
    #[must_use]
    pub fn new(retriever: Arc<dyn SampleRetriever>) -> Self {
        Self {
            retriever,
            limit: DEFAULT_SAMPLE_LIMIT,
        }
    }

    /// Sets the number of samples requested.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl WorkerAgent for SampleRetrievalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::SampleRetrieval
    }

    async fn invoke(
        &self,
        _request: &str,
        state: &PipelineState,
        ctx: &UserContext,
    ) -> Result<StateDelta, AgentError> {
        let name = self.kind().name();
        let samples = self
            .retriever
            .retrieve_samples(ctx.connection_id, state.query(), self.limit)
            .await
            .map_err(|e| AgentError::tool(name, "retrieve_samples", format!("{e:#}")))?;

        let summary = format!("Retrieved {} reference sample(s)", samples.len());
        Ok(StateDelta::new()
            .samples(SampleRetrievalResult { samples })
            .message(Message::assistant(summary).with_name(name)))
    }
}
