//! Assertions over run outcomes and states.

use crate::core::{PipelineOutcome, PipelineStage};
use crate::state::PipelineState;

/// Asserts that the run succeeded.
pub fn assert_outcome_succeeded(outcome: &PipelineOutcome) {
    assert!(
        outcome.success,
        "Expected success, got error {:?} (final stage {})",
        outcome.error, outcome.final_stage
    );
    assert_eq!(outcome.final_stage, PipelineStage::Completed.as_str());
}

/// Asserts that the run failed with an error message.
pub fn assert_outcome_failed(outcome: &PipelineOutcome) {
    assert!(!outcome.success, "Expected failure, got {:?}", outcome.result);
    assert_eq!(outcome.final_stage, crate::core::ERROR_STAGE);
    assert!(outcome.error.is_some(), "Failed outcome has no error message");
}

/// Asserts the stage the run ended in.
pub fn assert_stage(state: &PipelineState, expected: PipelineStage) {
    assert_eq!(
        state.current_stage(),
        expected,
        "Expected stage {}, got {} (errors: {:?})",
        expected,
        state.current_stage(),
        state.error_history().iter().map(|e| e.summary()).collect::<Vec<_>>()
    );
}

/// Asserts the `(source, stage)` pairs of the error history, oldest first.
pub fn assert_error_sources(state: &PipelineState, expected: &[(&str, PipelineStage)]) {
    let actual: Vec<(&str, PipelineStage)> = state
        .error_history()
        .iter()
        .map(|e| (e.source.as_str(), e.stage))
        .collect();
    assert_eq!(actual, expected, "Unexpected error history");
}

/// Asserts that no SQL reached execution without passing validation.
pub fn assert_only_cleared_sql_executed(state: &PipelineState) {
    for record in state.execution_results() {
        assert!(
            state.is_cleared_for_execution(&record.sql),
            "Executed SQL was never cleared: {}",
            record.sql
        );
    }
}
