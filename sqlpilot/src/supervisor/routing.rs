//! Default routing: which agent runs in a stage, what it is asked, and where
//! the run goes after it answers.

use crate::agents::{looks_malformed, AgentKind};
use crate::core::PipelineStage;
use crate::errors::AgentError;
use crate::state::PipelineState;

/// What the supervisor does after an agent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Move to `to` without touching the retry budget.
    Goto {
        to: PipelineStage,
        reason: &'static str,
    },
    /// Validate the patched candidate again.
    Revalidate,
    /// Stay in execution and run the chart agent next.
    AwaitChart,
    /// Record the failure, spend one retry and go to `retry_at`, or escalate
    /// once the budget is spent.
    Fail {
        retry_at: PipelineStage,
        kind: String,
        message: String,
    },
    /// Record the failure without spending budget and go to `to`.
    Tolerate {
        to: PipelineStage,
        kind: String,
        message: String,
    },
}

impl Decision {
    fn fail(retry_at: PipelineStage, err: &AgentError) -> Self {
        Self::Fail {
            retry_at,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    fn tolerate(to: PipelineStage, err: &AgentError) -> Self {
        Self::Tolerate {
            to,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// The stage this decision leads to, before budget checks.
    pub(crate) fn target(&self, current: PipelineStage) -> PipelineStage {
        match self {
            Self::Goto { to, .. } | Self::Tolerate { to, .. } => *to,
            Self::Revalidate | Self::AwaitChart => current,
            Self::Fail { retry_at, .. } => *retry_at,
        }
    }
}

/// How an agent call went, as seen by routing.
#[derive(Debug)]
pub(crate) enum Attempt<'a> {
    /// The delta was merged.
    Merged {
        /// The delta appended a SQL candidate.
        new_sql: bool,
        /// The delta appended an execution record.
        new_execution: bool,
    },
    /// The agent failed, or was not called.
    Failed(&'a AgentError),
}

/// Inputs to routing that live outside the state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RouteContext {
    pub samples_enabled: bool,
    pub chart_wanted: bool,
    pub fix_passes: u32,
    pub max_fix_passes: u32,
}

/// The agent that works in `stage`.
pub(crate) fn agent_for(stage: PipelineStage, awaiting_chart: bool) -> Option<AgentKind> {
    match stage {
        PipelineStage::SchemaAnalysis => Some(AgentKind::Schema),
        PipelineStage::SampleRetrieval => Some(AgentKind::SampleRetrieval),
        PipelineStage::SqlGeneration => Some(AgentKind::SqlGenerator),
        PipelineStage::SqlValidation => Some(AgentKind::SqlValidator),
        PipelineStage::SqlExecution if awaiting_chart => Some(AgentKind::Chart),
        PipelineStage::SqlExecution => Some(AgentKind::SqlExecutor),
        PipelineStage::ErrorRecovery | PipelineStage::Completed => None,
    }
}

/// The instruction sent to `agent`.
pub(crate) fn request_for(agent: AgentKind, state: &PipelineState) -> String {
    let sql = state.latest_sql().unwrap_or_default();
    match agent {
        AgentKind::Schema => format!("Find the tables needed to answer: {}", state.query()),
        AgentKind::SampleRetrieval => {
            format!("Find reference queries similar to: {}", state.query())
        }
        AgentKind::SqlGenerator if state.feedback_for_regeneration().is_empty() => {
            format!("Write one SQL query answering: {}", state.query())
        }
        AgentKind::SqlGenerator => format!(
            "Rewrite the SQL for: {} (attempt {}, fix the listed problems)",
            state.query(),
            state.generated_sql().len() + 1
        ),
        AgentKind::SqlValidator => format!("Validate this SQL: {sql}"),
        AgentKind::SqlExecutor => format!("Execute this SQL: {sql}"),
        AgentKind::Chart => format!("Chart the result of: {}", state.query()),
    }
}

/// Routing after `agent` ran in `stage`.
pub(crate) fn decide(
    agent: AgentKind,
    attempt: &Attempt<'_>,
    state: &PipelineState,
    route: RouteContext,
) -> Decision {
    use PipelineStage::{Completed, SampleRetrieval, SchemaAnalysis, SqlExecution, SqlGeneration, SqlValidation};

    match (agent, attempt) {
        (AgentKind::Schema, Attempt::Merged { .. }) => {
            let to = if route.samples_enabled { SampleRetrieval } else { SqlGeneration };
            Decision::Goto { to, reason: "schema_ready" }
        }
        (AgentKind::Schema, Attempt::Failed(err)) => Decision::fail(SchemaAnalysis, err),

        (AgentKind::SampleRetrieval, Attempt::Merged { .. }) => Decision::Goto {
            to: SqlGeneration,
            reason: "samples_ready",
        },
        (AgentKind::SampleRetrieval, Attempt::Failed(err)) => Decision::tolerate(SqlGeneration, err),

        (AgentKind::SqlGenerator, Attempt::Merged { new_sql: true, .. }) => Decision::Goto {
            to: SqlValidation,
            reason: "sql_generated",
        },
        (AgentKind::SqlGenerator, Attempt::Merged { new_sql: false, .. }) => Decision::Fail {
            retry_at: SqlGeneration,
            kind: "invalid_response".to_string(),
            message: "generator returned no SQL".to_string(),
        },
        (AgentKind::SqlGenerator, Attempt::Failed(err)) => Decision::fail(SqlGeneration, err),

        (AgentKind::SqlValidator, Attempt::Merged { new_sql, .. }) => {
            let cleared = state
                .latest_sql()
                .is_some_and(|sql| state.is_cleared_for_execution(sql));
            if cleared {
                Decision::Goto {
                    to: SqlExecution,
                    reason: "sql_cleared",
                }
            } else if *new_sql && route.fix_passes < route.max_fix_passes {
                Decision::Revalidate
            } else {
                let feedback = state.feedback_for_regeneration();
                let message = if feedback.is_empty() {
                    "SQL did not pass validation".to_string()
                } else {
                    format!("SQL did not pass validation: {}", feedback.join("; "))
                };
                Decision::Fail {
                    retry_at: SqlGeneration,
                    kind: "validation_rejected".to_string(),
                    message,
                }
            }
        }
        (AgentKind::SqlValidator, Attempt::Failed(err)) => Decision::fail(SqlGeneration, err),

        (AgentKind::SqlExecutor, Attempt::Merged { new_execution: false, .. }) => Decision::Fail {
            retry_at: SqlExecution,
            kind: "invalid_response".to_string(),
            message: "executor returned no result".to_string(),
        },
        (AgentKind::SqlExecutor, Attempt::Merged { .. }) => match state.latest_execution() {
            Some(record) if record.success => {
                if route.chart_wanted {
                    Decision::AwaitChart
                } else {
                    Decision::Goto {
                        to: Completed,
                        reason: "query_answered",
                    }
                }
            }
            record => {
                let error = record
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "query failed".to_string());
                let retry_at = if looks_malformed(&error) { SqlGeneration } else { SqlExecution };
                Decision::Fail {
                    retry_at,
                    kind: "execution_failed".to_string(),
                    message: error,
                }
            }
        },
        (AgentKind::SqlExecutor, Attempt::Failed(err)) => {
            let regenerate = matches!(err, AgentError::Rejected(_) | AgentError::MissingInput { .. });
            Decision::fail(if regenerate { SqlGeneration } else { SqlExecution }, err)
        }

        (AgentKind::Chart, Attempt::Merged { .. }) => Decision::Goto {
            to: Completed,
            reason: "chart_ready",
        },
        (AgentKind::Chart, Attempt::Failed(err)) => Decision::tolerate(Completed, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ExecutionRecord, StateDelta};
    use pretty_assertions::assert_eq;

    const ROUTE: RouteContext = RouteContext {
        samples_enabled: false,
        chart_wanted: false,
        fix_passes: 0,
        max_fix_passes: 3,
    };

    fn merged(new_sql: bool, new_execution: bool) -> Attempt<'static> {
        Attempt::Merged { new_sql, new_execution }
    }

    #[test]
    fn test_agent_for_every_active_stage() {
        for stage in PipelineStage::ALL {
            assert_eq!(agent_for(stage, false).is_some(), !stage.is_terminal(), "{stage}");
        }
        assert_eq!(agent_for(PipelineStage::SqlExecution, true), Some(AgentKind::Chart));
    }

    #[test]
    fn test_schema_success_honours_sample_hop() {
        let state = PipelineState::new("q", 3);
        let plain = decide(AgentKind::Schema, &merged(false, false), &state, ROUTE);
        assert_eq!(plain.target(state.current_stage()), PipelineStage::SqlGeneration);

        let with_samples = RouteContext { samples_enabled: true, ..ROUTE };
        let hop = decide(AgentKind::Schema, &merged(false, false), &state, with_samples);
        assert_eq!(hop.target(state.current_stage()), PipelineStage::SampleRetrieval);
    }

    #[test]
    fn test_sample_failure_is_tolerated() {
        let state = PipelineState::new("q", 3);
        let err = AgentError::tool("sample_retrieval_agent", "search", "index offline");
        let decision = decide(AgentKind::SampleRetrieval, &Attempt::Failed(&err), &state, ROUTE);
        assert!(matches!(decision, Decision::Tolerate { to: PipelineStage::SqlGeneration, .. }));
    }

    #[test]
    fn test_unvalidated_patch_is_revalidated_until_passes_run_out() {
        let mut state = PipelineState::new("q", 3);
        state.apply(StateDelta::new().sql("SELECT a FROM t LIMIT 100")).unwrap();

        let decision = decide(AgentKind::SqlValidator, &merged(true, false), &state, ROUTE);
        assert_eq!(decision, Decision::Revalidate);

        let spent = RouteContext { fix_passes: 3, ..ROUTE };
        let decision = decide(AgentKind::SqlValidator, &merged(true, false), &state, spent);
        assert!(matches!(
            decision,
            Decision::Fail { retry_at: PipelineStage::SqlGeneration, ref kind, .. } if kind == "validation_rejected"
        ));
    }

    #[test]
    fn test_malformed_execution_error_regenerates() {
        let mut state = PipelineState::new("q", 3);
        state
            .apply(StateDelta::new().execution(ExecutionRecord::failed(
                "SELECT nme FROM t",
                "no such column: nme",
                1.0,
            )))
            .unwrap();
        let decision = decide(AgentKind::SqlExecutor, &merged(false, true), &state, ROUTE);
        assert_eq!(decision.target(PipelineStage::SqlExecution), PipelineStage::SqlGeneration);

        let mut state = PipelineState::new("q", 3);
        state
            .apply(StateDelta::new().execution(ExecutionRecord::failed(
                "SELECT 1",
                "connection reset by peer",
                1.0,
            )))
            .unwrap();
        let decision = decide(AgentKind::SqlExecutor, &merged(false, true), &state, ROUTE);
        assert_eq!(decision.target(PipelineStage::SqlExecution), PipelineStage::SqlExecution);
    }

    #[test]
    fn test_rejected_execution_regenerates() {
        let state = PipelineState::new("q", 3);
        let err = AgentError::Rejected("DROP TABLE t".to_string());
        let decision = decide(AgentKind::SqlExecutor, &Attempt::Failed(&err), &state, ROUTE);
        assert_eq!(decision.target(PipelineStage::SqlExecution), PipelineStage::SqlGeneration);
    }

    #[test]
    fn test_generator_request_marks_rewrites() {
        let mut state = PipelineState::new("how many students", 3);
        state
            .apply(
                StateDelta::new()
                    .sql("SELECT nme FROM students")
                    .execution(ExecutionRecord::failed("SELECT nme FROM students", "no such column: nme", 1.0)),
            )
            .unwrap();
        assert_eq!(
            request_for(AgentKind::SqlGenerator, &state),
            "Rewrite the SQL for: how many students (attempt 2, fix the listed problems)"
        );
        assert_eq!(
            request_for(AgentKind::SqlGenerator, &PipelineState::new("how many students", 3)),
            "Write one SQL query answering: how many students"
        );
    }
}
