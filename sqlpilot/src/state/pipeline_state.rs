//! The shared record threaded through every stage of a run.

use super::delta::StateDelta;
use super::records::{
    ChartArtifact, ErrorRecord, ExecutionRecord, Message, QueryAnalysis, SampleRetrievalResult,
    SchemaInfo, ValidationKind, ValidationRecord,
};
use crate::core::PipelineStage;
use crate::errors::StateMergeError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation status of one SQL string, as recorded in the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqlVerdict {
    /// `None` until a syntax record exists for the SQL.
    pub syntax_valid: Option<bool>,
    /// `None` until a security record exists for the SQL.
    pub secure: Option<bool>,
}

impl SqlVerdict {
    /// Returns true if both checks ran and passed.
    #[must_use]
    pub fn cleared(&self) -> bool {
        self.syntax_valid == Some(true) && self.secure == Some(true)
    }
}

/// State of one pipeline run.
///
/// Fields are read through accessors and written only through
/// [`PipelineState::apply`], which enforces the merge protocol: accumulating
/// fields only grow, replace fields are overwritten, and stage changes must
/// follow the routing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    run_id: Uuid,
    query: String,
    conversation: Vec<Message>,
    query_analysis: Vec<QueryAnalysis>,
    schema_info: Vec<SchemaInfo>,
    generated_sql: Vec<String>,
    validation_results: Vec<ValidationRecord>,
    execution_results: Vec<ExecutionRecord>,
    sample_retrieval_result: Option<SampleRetrievalResult>,
    chart: Option<ChartArtifact>,
    retry_count: u32,
    max_retries: u32,
    current_stage: PipelineStage,
    error_history: Vec<ErrorRecord>,
}

impl PipelineState {
    /// Creates the initial state for a question.
    ///
    /// The question is the first conversation entry; every other
    /// accumulating field starts empty.
    #[must_use]
    pub fn new(query: impl Into<String>, max_retries: u32) -> Self {
        let query = query.into();
        Self {
            run_id: crate::utils::generate_uuid(),
            conversation: vec![Message::user(query.clone())],
            query,
            query_analysis: Vec::new(),
            schema_info: Vec::new(),
            generated_sql: Vec::new(),
            validation_results: Vec::new(),
            execution_results: Vec::new(),
            sample_retrieval_result: None,
            chart: None,
            retry_count: 0,
            max_retries,
            current_stage: PipelineStage::SchemaAnalysis,
            error_history: Vec::new(),
        }
    }

    /// Applies a delta.
    ///
    /// The delta is checked as a whole before anything is written, so a
    /// rejected delta leaves the state untouched.
    pub fn apply(&mut self, delta: StateDelta) -> Result<(), StateMergeError> {
        let next_stage = match &delta.current_stage {
            Some(proposal) => {
                let stage = proposal.resolve()?;
                if stage != self.current_stage {
                    self.current_stage.check_transition(stage)?;
                }
                Some(stage)
            }
            None => None,
        };

        let retry_count = delta.retry_count.unwrap_or(self.retry_count);
        if retry_count < self.retry_count {
            return Err(StateMergeError::RetryCountRegressed {
                current: self.retry_count,
                proposed: retry_count,
            });
        }
        let max_retries = delta.max_retries.unwrap_or(self.max_retries);
        if retry_count > max_retries {
            return Err(StateMergeError::RetryBudgetShrunk {
                spent: retry_count,
                proposed: max_retries,
            });
        }

        let StateDelta {
            conversation,
            query_analysis,
            schema_info,
            generated_sql,
            validation_results,
            execution_results,
            error_history,
            current_stage: _,
            retry_count: _,
            max_retries: _,
            sample_retrieval_result,
            chart,
        } = delta;

        self.conversation.extend(conversation);
        self.query_analysis.extend(query_analysis);
        self.schema_info.extend(schema_info);
        self.generated_sql.extend(generated_sql);
        self.validation_results.extend(validation_results);
        self.execution_results.extend(execution_results);
        self.error_history.extend(error_history);

        if let Some(stage) = next_stage {
            self.current_stage = stage;
        }
        self.retry_count = retry_count;
        self.max_retries = max_retries;
        if sample_retrieval_result.is_some() {
            self.sample_retrieval_result = sample_retrieval_result;
        }
        if chart.is_some() {
            self.chart = chart;
        }
        Ok(())
    }

    /// The run's identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The question being answered.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Conversation so far, oldest first.
    #[must_use]
    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    /// All query analyses, oldest first.
    #[must_use]
    pub fn query_analysis(&self) -> &[QueryAnalysis] {
        &self.query_analysis
    }

    /// All schema snapshots, oldest first.
    #[must_use]
    pub fn schema_history(&self) -> &[SchemaInfo] {
        &self.schema_info
    }

    /// All SQL candidates, oldest first.
    #[must_use]
    pub fn generated_sql(&self) -> &[String] {
        &self.generated_sql
    }

    /// All validation records, oldest first.
    #[must_use]
    pub fn validation_results(&self) -> &[ValidationRecord] {
        &self.validation_results
    }

    /// All execution records, oldest first.
    #[must_use]
    pub fn execution_results(&self) -> &[ExecutionRecord] {
        &self.execution_results
    }

    /// All recorded errors, oldest first.
    #[must_use]
    pub fn error_history(&self) -> &[ErrorRecord] {
        &self.error_history
    }

    /// Sample payload, if retrieved.
    #[must_use]
    pub fn sample_retrieval_result(&self) -> Option<&SampleRetrievalResult> {
        self.sample_retrieval_result.as_ref()
    }

    /// Chart, if produced.
    #[must_use]
    pub fn chart(&self) -> Option<&ChartArtifact> {
        self.chart.as_ref()
    }

    /// Recoverable failures so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Retry budget.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The stage the run is in.
    #[must_use]
    pub fn current_stage(&self) -> PipelineStage {
        self.current_stage
    }

    /// Returns true once the retry budget is spent.
    #[must_use]
    pub fn budget_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// The current schema snapshot.
    #[must_use]
    pub fn latest_schema(&self) -> Option<&SchemaInfo> {
        self.schema_info.last()
    }

    /// The most recent analysis.
    #[must_use]
    pub fn latest_analysis(&self) -> Option<&QueryAnalysis> {
        self.query_analysis.last()
    }

    /// The most recent SQL candidate.
    #[must_use]
    pub fn latest_sql(&self) -> Option<&str> {
        self.generated_sql.last().map(String::as_str)
    }

    /// The most recent execution record.
    #[must_use]
    pub fn latest_execution(&self) -> Option<&ExecutionRecord> {
        self.execution_results.last()
    }

    /// The most recent error.
    #[must_use]
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.error_history.last()
    }

    /// The most recent record of `kind`.
    #[must_use]
    pub fn latest_validation(&self, kind: ValidationKind) -> Option<&ValidationRecord> {
        self.validation_results.iter().rev().find(|r| r.kind == kind)
    }

    /// Validation records that judged `sql`, oldest first.
    pub fn validations_for<'a>(&'a self, sql: &'a str) -> impl Iterator<Item = &'a ValidationRecord> + 'a {
        let digest = crate::utils::sql_digest(sql);
        self.validation_results
            .iter()
            .filter(move |r| r.sql_digest == digest)
    }

    /// Summarises the syntax and security records for `sql`.
    ///
    /// A single failing record is enough to mark the check as failed.
    #[must_use]
    pub fn verdict_for(&self, sql: &str) -> SqlVerdict {
        let mut verdict = SqlVerdict::default();
        for record in self.validations_for(sql) {
            match record.kind {
                ValidationKind::Syntax => {
                    let ok = record.success && record.is_valid;
                    verdict.syntax_valid = Some(verdict.syntax_valid.unwrap_or(true) && ok);
                }
                ValidationKind::Security => {
                    let ok = record.success && record.is_secure;
                    verdict.secure = Some(verdict.secure.unwrap_or(true) && ok);
                }
                ValidationKind::Performance | ValidationKind::Fix => {}
            }
        }
        verdict
    }

    /// Returns true if `sql` passed both syntax and security checks.
    #[must_use]
    pub fn is_cleared_for_execution(&self, sql: &str) -> bool {
        self.verdict_for(sql).cleared()
    }

    /// Problems reported against earlier candidates, for regeneration.
    #[must_use]
    pub fn feedback_for_regeneration(&self) -> Vec<String> {
        let mut feedback = Vec::new();
        let Some(sql) = self.latest_sql() else {
            return feedback;
        };
        for record in self.validations_for(sql) {
            feedback.extend(record.errors.iter().map(|e| format!("[{}] {e}", record.kind)));
            feedback.extend(
                record
                    .security_issues
                    .iter()
                    .map(|e| format!("[{}] {e}", record.kind)),
            );
        }
        if let Some(exec) = self.latest_execution() {
            if !exec.success && exec.sql == sql {
                if let Some(err) = &exec.error {
                    feedback.push(format!("[execution] {err}"));
                }
            }
        }
        feedback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::records::ExecutionRecord;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initial_state() {
        let state = PipelineState::new("how many students", 3);

        assert_eq!(state.current_stage(), PipelineStage::SchemaAnalysis);
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.max_retries(), 3);
        assert_eq!(state.conversation().len(), 1);
        assert!(state.generated_sql().is_empty());
        assert!(state.error_history().is_empty());
        assert!(state.latest_schema().is_none());
    }

    #[test]
    fn test_apply_appends_in_order() {
        let mut state = PipelineState::new("q", 3);
        state.apply(StateDelta::new().sql("SELECT 1")).unwrap();
        state.apply(StateDelta::new().sql("SELECT 2")).unwrap();

        assert_eq!(state.generated_sql(), &["SELECT 1", "SELECT 2"]);
        assert_eq!(state.latest_sql(), Some("SELECT 2"));
    }

    #[test]
    fn test_unknown_stage_rejected_without_side_effects() {
        let mut state = PipelineState::new("q", 3);
        let before = state.clone();

        let err = state
            .apply(StateDelta::new().sql("SELECT 1").stage_name("charting"))
            .unwrap_err();

        assert_eq!(err, StateMergeError::InvalidStage("charting".to_string()));
        assert_eq!(state, before);
    }

    #[test]
    fn test_disallowed_transition_rejected() {
        let mut state = PipelineState::new("q", 3);
        let err = state
            .apply(StateDelta::new().stage(PipelineStage::SqlExecution))
            .unwrap_err();
        assert!(matches!(err, StateMergeError::DisallowedTransition { .. }));
        assert_eq!(state.current_stage(), PipelineStage::SchemaAnalysis);
    }

    #[test]
    fn test_same_stage_is_not_a_transition() {
        let mut state = PipelineState::new("q", 3);
        state
            .apply(StateDelta::new().stage(PipelineStage::SchemaAnalysis))
            .unwrap();
        assert_eq!(state.current_stage(), PipelineStage::SchemaAnalysis);
    }

    #[test]
    fn test_retry_count_cannot_regress() {
        let mut state = PipelineState::new("q", 3);
        state.apply(StateDelta::new().retry_count(2)).unwrap();
        let err = state.apply(StateDelta::new().retry_count(1)).unwrap_err();
        assert_eq!(
            err,
            StateMergeError::RetryCountRegressed { current: 2, proposed: 1 }
        );
    }

    #[test]
    fn test_retry_count_cannot_exceed_budget() {
        let mut state = PipelineState::new("q", 2);
        assert!(state.apply(StateDelta::new().retry_count(3)).is_err());
        state.apply(StateDelta::new().retry_count(2)).unwrap();
        assert!(state.budget_exhausted());
    }

    #[test]
    fn test_verdict_requires_both_checks() {
        let sql = "SELECT id FROM users LIMIT 10";
        let mut state = PipelineState::new("q", 3);
        assert!(!state.is_cleared_for_execution(sql));

        state
            .apply(StateDelta::new().validation(ValidationRecord::new(ValidationKind::Syntax, sql)))
            .unwrap();
        assert!(!state.is_cleared_for_execution(sql));

        state
            .apply(StateDelta::new().validation(ValidationRecord::new(ValidationKind::Security, sql)))
            .unwrap();
        assert!(state.is_cleared_for_execution(sql));
        assert!(!state.is_cleared_for_execution("SELECT 1"));
    }

    #[test]
    fn test_failing_syntax_record_blocks_sql() {
        let sql = "DROP TABLE x";
        let mut failing = ValidationRecord::new(ValidationKind::Syntax, sql);
        failing.is_valid = false;
        failing.errors.push("Dangerous keyword: DROP".to_string());

        let mut state = PipelineState::new("q", 3);
        state
            .apply(
                StateDelta::new()
                    .validation(failing)
                    .validation(ValidationRecord::new(ValidationKind::Security, sql)),
            )
            .unwrap();

        let verdict = state.verdict_for(sql);
        assert_eq!(verdict.syntax_valid, Some(false));
        assert!(!verdict.cleared());
    }

    #[test]
    fn test_feedback_collects_errors_for_latest_sql() {
        let sql = "SELECT * FROM t WHERE x = 1 OR 1=1";
        let mut insecure = ValidationRecord::new(ValidationKind::Security, sql);
        insecure.is_secure = false;
        insecure.security_issues.push("tautology".to_string());

        let mut state = PipelineState::new("q", 3);
        state
            .apply(
                StateDelta::new()
                    .sql(sql)
                    .validation(insecure)
                    .execution(ExecutionRecord::failed("SELECT 1", "ignored", 1.0)),
            )
            .unwrap();

        assert_eq!(state.feedback_for_regeneration(), vec!["[security] tautology"]);
    }
}
