//! What a caller gets back from a pipeline run.

use super::PipelineStage;
use crate::state::{ChartArtifact, ErrorRecord, ExecutionRecord, PipelineState, ValidationRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stage name reported for every failed run.
pub const ERROR_STAGE: &str = "error";

/// The answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// The SQL that produced the rows.
    pub sql: String,
    /// Column names.
    pub columns: Vec<String>,
    /// Positional rows.
    pub rows: Vec<Vec<Value>>,
    /// Number of rows.
    pub row_count: usize,
    /// Rendered result, if the executor produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// Wall-clock execution time.
    pub execution_time_ms: f64,
    /// Chart, if one was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartArtifact>,
}

impl QueryAnswer {
    fn from_execution(execution: &ExecutionRecord, chart: Option<&ChartArtifact>) -> Self {
        Self {
            sql: execution.sql.clone(),
            columns: execution.columns.clone(),
            rows: execution.rows.clone().unwrap_or_default(),
            row_count: execution.row_count,
            formatted: execution.formatted.clone(),
            execution_time_ms: execution.execution_time_ms,
            chart: chart.cloned(),
        }
    }
}

/// Post-mortem data attached to failed runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Every recorded error, oldest first.
    pub error_history: Vec<ErrorRecord>,
    /// The last validation record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validation: Option<ValidationRecord>,
    /// The last execution record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<ExecutionRecord>,
    /// Retries spent.
    pub retry_count: u32,
    /// Supervisor iterations used.
    pub iterations: u32,
}

/// Result of [`run_query`](crate::facade::SqlPilot::run_query).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// The run reached `completed` with a successful execution.
    pub success: bool,
    /// The answer, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryAnswer>,
    /// A human-readable error, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `completed` on success, `error` otherwise.
    pub final_stage: String,
    /// Failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl PipelineOutcome {
    /// Builds the outcome of a finished run.
    #[must_use]
    pub fn from_state(state: &PipelineState, iterations: u32) -> Self {
        let answer = state
            .latest_execution()
            .filter(|e| e.success && state.current_stage() == PipelineStage::Completed);

        if let Some(execution) = answer {
            return Self {
                success: true,
                result: Some(QueryAnswer::from_execution(execution, state.chart())),
                error: None,
                final_stage: PipelineStage::Completed.to_string(),
                diagnostics: None,
            };
        }

        let error = state.last_error().map_or_else(
            || format!("Pipeline stopped in stage {}", state.current_stage()),
            ErrorRecord::summary,
        );
        Self::failure(
            error,
            Diagnostics {
                error_history: state.error_history().to_vec(),
                last_validation: state.validation_results().last().cloned(),
                last_execution: state.latest_execution().cloned(),
                retry_count: state.retry_count(),
                iterations,
            },
        )
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>, diagnostics: Diagnostics) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            final_stage: ERROR_STAGE.to_string(),
            diagnostics: Some(diagnostics),
        }
    }

    /// The chart, if the run produced one.
    #[must_use]
    pub fn chart(&self) -> Option<&ChartArtifact> {
        self.result.as_ref().and_then(|r| r.chart.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateDelta;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_failure_reports_last_error() {
        let mut state = PipelineState::new("q", 3);
        state
            .apply(
                StateDelta::new()
                    .error(ErrorRecord::new("schema_agent", PipelineStage::SchemaAnalysis, "tool", "down"))
                    .stage(PipelineStage::ErrorRecovery),
            )
            .unwrap();

        let outcome = PipelineOutcome::from_state(&state, 4);
        assert!(!outcome.success);
        assert_eq!(outcome.final_stage, "error");
        assert_eq!(outcome.error.as_deref(), Some("schema_agent@schema_analysis: down"));
        let diagnostics = outcome.diagnostics.unwrap();
        assert_eq!(diagnostics.iterations, 4);
        assert_eq!(diagnostics.error_history.len(), 1);
    }

    #[test]
    fn test_completed_run_carries_answer() {
        let mut state = PipelineState::new("q", 3);
        let record = ExecutionRecord {
            sql: "SELECT 1".to_string(),
            success: true,
            columns: vec!["n".to_string()],
            rows: Some(vec![vec![json!(1)]]),
            row_count: 1,
            ..Default::default()
        };
        for delta in [
            StateDelta::new().stage(PipelineStage::SqlGeneration),
            StateDelta::new().stage(PipelineStage::SqlValidation),
            StateDelta::new().stage(PipelineStage::SqlExecution),
            StateDelta::new().execution(record).stage(PipelineStage::Completed),
        ] {
            state.apply(delta).unwrap();
        }

        let outcome = PipelineOutcome::from_state(&state, 5);
        assert!(outcome.success);
        assert_eq!(outcome.final_stage, "completed");
        assert_eq!(outcome.result.unwrap().rows, vec![vec![json!(1)]]);
        assert!(outcome.diagnostics.is_none());
    }

    #[test]
    fn test_outcome_serializes_without_empty_fields() {
        let outcome = PipelineOutcome::failure(
            "boom",
            Diagnostics {
                error_history: Vec::new(),
                last_validation: None,
                last_execution: None,
                retry_count: 0,
                iterations: 1,
            },
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["final_stage"], "error");
    }
}
