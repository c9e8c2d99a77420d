//! Sparse partial updates returned by worker agents.

use super::records::{
    ChartArtifact, ErrorRecord, ExecutionRecord, Message, QueryAnalysis, SampleRetrievalResult,
    SchemaInfo, ValidationRecord,
};
use crate::core::{PipelineStage, StageProposal};
use serde::{Deserialize, Serialize};

/// A partial update to [`PipelineState`](super::PipelineState).
///
/// Accumulating fields hold entries to append; `Option` fields hold
/// replacement values and are left untouched when `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Messages to append.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation: Vec<Message>,
    /// Analyses to append.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_analysis: Vec<QueryAnalysis>,
    /// Schema snapshots to append; the last one is current.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_info: Vec<SchemaInfo>,
    /// SQL candidates to append.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated_sql: Vec<String>,
    /// Validation records to append.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_results: Vec<ValidationRecord>,
    /// Execution records to append.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_results: Vec<ExecutionRecord>,
    /// Errors to append.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_history: Vec<ErrorRecord>,
    /// Replacement stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageProposal>,
    /// Replacement retry counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Replacement retry budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Replacement sample payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_retrieval_result: Option<SampleRetrievalResult>,
    /// Replacement chart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartArtifact>,
}

impl StateDelta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a conversation message.
    #[must_use]
    pub fn message(mut self, message: Message) -> Self {
        self.conversation.push(message);
        self
    }

    /// Appends a query analysis.
    #[must_use]
    pub fn analysis(mut self, analysis: QueryAnalysis) -> Self {
        self.query_analysis.push(analysis);
        self
    }

    /// Appends a schema snapshot.
    #[must_use]
    pub fn schema(mut self, schema: SchemaInfo) -> Self {
        self.schema_info.push(schema);
        self
    }

    /// Appends a SQL candidate.
    #[must_use]
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.generated_sql.push(sql.into());
        self
    }

    /// Appends a validation record.
    #[must_use]
    pub fn validation(mut self, record: ValidationRecord) -> Self {
        self.validation_results.push(record);
        self
    }

    /// Appends an execution record.
    #[must_use]
    pub fn execution(mut self, record: ExecutionRecord) -> Self {
        self.execution_results.push(record);
        self
    }

    /// Appends an error record.
    #[must_use]
    pub fn error(mut self, record: ErrorRecord) -> Self {
        self.error_history.push(record);
        self
    }

    /// Proposes a stage.
    #[must_use]
    pub fn stage(mut self, stage: PipelineStage) -> Self {
        self.current_stage = Some(StageProposal::Known(stage));
        self
    }

    /// Proposes a stage by name; unknown names are rejected at merge time.
    #[must_use]
    pub fn stage_name(mut self, name: &str) -> Self {
        self.current_stage = Some(StageProposal::parse(name));
        self
    }

    /// Replaces the retry counter.
    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Replaces the retry budget.
    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Replaces the sample payload.
    #[must_use]
    pub fn samples(mut self, samples: SampleRetrievalResult) -> Self {
        self.sample_retrieval_result = Some(samples);
        self
    }

    /// Replaces the chart.
    #[must_use]
    pub fn chart(mut self, chart: ChartArtifact) -> Self {
        self.chart = Some(chart);
        self
    }

    /// Combines two deltas: accumulating fields concatenate (`self` first),
    /// replace fields take `other`'s value when it has one.
    #[must_use]
    pub fn combine(mut self, other: StateDelta) -> Self {
        let StateDelta {
            conversation,
            query_analysis,
            schema_info,
            generated_sql,
            validation_results,
            execution_results,
            error_history,
            current_stage,
            retry_count,
            max_retries,
            sample_retrieval_result,
            chart,
        } = other;

        self.conversation.extend(conversation);
        self.query_analysis.extend(query_analysis);
        self.schema_info.extend(schema_info);
        self.generated_sql.extend(generated_sql);
        self.validation_results.extend(validation_results);
        self.execution_results.extend(execution_results);
        self.error_history.extend(error_history);
        if current_stage.is_some() {
            self.current_stage = current_stage;
        }
        if retry_count.is_some() {
            self.retry_count = retry_count;
        }
        if max_retries.is_some() {
            self.max_retries = max_retries;
        }
        if sample_retrieval_result.is_some() {
            self.sample_retrieval_result = sample_retrieval_result;
        }
        if chart.is_some() {
            self.chart = chart;
        }
        self
    }

    /// Returns true if the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }

    /// Names of the fields this delta touches.
    #[must_use]
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !self.conversation.is_empty() {
            fields.push("conversation");
        }
        if !self.query_analysis.is_empty() {
            fields.push("query_analysis");
        }
        if !self.schema_info.is_empty() {
            fields.push("schema_info");
        }
        if !self.generated_sql.is_empty() {
            fields.push("generated_sql");
        }
        if !self.validation_results.is_empty() {
            fields.push("validation_results");
        }
        if !self.execution_results.is_empty() {
            fields.push("execution_results");
        }
        if !self.error_history.is_empty() {
            fields.push("error_history");
        }
        if self.current_stage.is_some() {
            fields.push("current_stage");
        }
        if self.retry_count.is_some() {
            fields.push("retry_count");
        }
        if self.max_retries.is_some() {
            fields.push("max_retries");
        }
        if self.sample_retrieval_result.is_some() {
            fields.push("sample_retrieval_result");
        }
        if self.chart.is_some() {
            fields.push("chart");
        }
        fields
    }
}
