//! SQL validation agent.

use super::{AgentKind, WorkerAgent};
use crate::errors::AgentError;
use crate::state::{Message, PipelineState, StateDelta, UserContext};
use crate::validation::{Finding, SqlValidator};
use async_trait::async_trait;

/// Validates the latest SQL candidate and patches fixable defects.
///
/// A patched candidate is appended to `generated_sql` and must be validated
/// again before it can run.
#[derive(Debug, Clone, Default)]
pub struct SqlValidatorAgent {
    validator: SqlValidator,
}

impl SqlValidatorAgent {
    /// Creates the agent.
    #[must_use]
    pub fn new(validator: SqlValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl WorkerAgent for SqlValidatorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::SqlValidator
    }

    async fn invoke(
        &self,
        _request: &str,
        state: &PipelineState,
        _ctx: &UserContext,
    ) -> Result<StateDelta, AgentError> {
        let name = self.kind().name();
        let sql = state
            .latest_sql()
            .ok_or_else(|| AgentError::missing_input(name, "generated SQL"))?;

        let report = self.validator.validate(sql);
        let repairs = self.validator.repairs_for(&report);
        let should_patch = if report.cleared() {
            repairs.contains(&Finding::MissingLimit)
        } else {
            report.is_fixable()
        };

        let mut delta = report
            .records()
            .into_iter()
            .fold(StateDelta::new(), StateDelta::validation);

        let mut summary = format!(
            "valid={} secure={} performance_score={}",
            report.is_valid(),
            report.is_secure(),
            report.performance_score()
        );

        if should_patch {
            let outcome = self.validator.fix(&report);
            if outcome.changed() {
                summary.push_str(&format!("; patched: {}", outcome.fixes_applied.join(", ")));
                delta = delta.validation(outcome.to_record()).sql(outcome.fixed_sql);
            }
        } else if !report.cleared() {
            summary.push_str(&format!("; rejected: {}", report.feedback().join("; ")));
        }

        tracing::debug!(
            agent = name,
            sql_digest = %crate::utils::short_digest(sql),
            valid = report.is_valid(),
            secure = report.is_secure(),
            "SQL validated"
        );

        Ok(delta.message(Message::assistant(summary).with_name(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ValidationKind;
    use pretty_assertions::assert_eq;

    fn state_with_sql(sql: &str) -> PipelineState {
        let mut state = PipelineState::new("q", 3);
        state.apply(StateDelta::new().sql(sql)).unwrap();
        state
    }

    async fn run(sql: &str) -> StateDelta {
        SqlValidatorAgent::default()
            .invoke("validate", &state_with_sql(sql), &UserContext::new(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_clean_sql_records_three_checks() {
        let delta = run("SELECT id FROM students WHERE grade = 3 LIMIT 10").await;
        let kinds: Vec<_> = delta.validation_results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ValidationKind::Syntax, ValidationKind::Security, ValidationKind::Performance]
        );
        assert!(delta.generated_sql.is_empty());
    }

    #[tokio::test]
    async fn test_missing_limit_is_patched() {
        let delta = run("SELECT id FROM students WHERE grade = 3").await;
        assert_eq!(
            delta.generated_sql,
            vec!["SELECT id FROM students WHERE grade = 3 LIMIT 100"]
        );
        assert_eq!(delta.validation_results.last().unwrap().kind, ValidationKind::Fix);
    }

    #[tokio::test]
    async fn test_drop_is_not_patched() {
        let delta = run("DROP TABLE students").await;
        assert!(delta.generated_sql.is_empty());
        assert!(!delta.validation_results[0].is_valid);
        assert!(delta.conversation[0].content.contains("rejected"));
    }

    #[tokio::test]
    async fn test_no_sql_is_missing_input() {
        let err = SqlValidatorAgent::default()
            .invoke("validate", &PipelineState::new("q", 3), &UserContext::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "missing_input");
    }
}
