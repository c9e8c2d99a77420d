//! Payload builders for supervisor events.
//!
//! Every payload is a flat JSON object carrying the run id, so a sink can
//! group events per run without extra context.

use crate::agents::AgentKind;
use crate::core::PipelineStage;
use crate::errors::AgentError;
use crate::state::PipelineState;
use crate::utils::iso_timestamp;
use serde_json::{json, Value};

/// Payload for `agent.invoked`, `agent.succeeded` and `agent.failed`.
#[must_use]
pub fn agent_payload(
    state: &PipelineState,
    agent: AgentKind,
    iteration: u32,
    duration_ms: Option<f64>,
    error: Option<&AgentError>,
) -> Value {
    let mut payload = json!({
        "run_id": state.run_id().to_string(),
        "agent": agent.name(),
        "stage": state.current_stage().as_str(),
        "iteration": iteration,
        "retry_count": state.retry_count(),
    });
    if let Some(ms) = duration_ms {
        payload["duration_ms"] = json!(ms);
    }
    if let Some(err) = error {
        payload["error_kind"] = json!(err.kind());
        payload["error"] = json!(err.to_string());
    }
    payload
}

/// Payload for `stage.transition` and `stage.clamped`.
#[must_use]
pub fn transition_payload(
    state: &PipelineState,
    from: PipelineStage,
    to: PipelineStage,
    reason: &str,
) -> Value {
    json!({
        "run_id": state.run_id().to_string(),
        "from": from.as_str(),
        "to": to.as_str(),
        "reason": reason,
        "retry_count": state.retry_count(),
    })
}

/// Payload for `pipeline.started`, `pipeline.completed` and `pipeline.failed`.
#[must_use]
pub fn pipeline_payload(state: &PipelineState, iterations: u32, duration_ms: Option<f64>) -> Value {
    let mut payload = json!({
        "run_id": state.run_id().to_string(),
        "stage": state.current_stage().as_str(),
        "iterations": iterations,
        "retry_count": state.retry_count(),
        "max_retries": state.max_retries(),
        "sql_attempts": state.generated_sql().len(),
        "errors": state.error_history().len(),
        "timestamp": iso_timestamp(),
    });
    if let Some(ms) = duration_ms {
        payload["duration_ms"] = json!(ms);
    }
    if let Some(last) = state.last_error() {
        payload["last_error"] = json!(last.summary());
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_agent_payload_with_error() {
        let state = PipelineState::new("q", 3);
        let err = AgentError::Timeout {
            agent: "schema_agent".to_string(),
            timeout_ms: 10,
        };
        let payload = agent_payload(&state, AgentKind::Schema, 1, Some(10.5), Some(&err));

        assert_eq!(payload["run_id"], state.run_id().to_string());
        assert_eq!(payload["agent"], "schema_agent");
        assert_eq!(payload["stage"], "schema_analysis");
        assert_eq!(payload["error_kind"], "timeout");
        assert_eq!(payload["duration_ms"], 10.5);
    }

    #[test]
    fn test_agent_payload_without_optional_fields() {
        let state = PipelineState::new("q", 3);
        let payload = agent_payload(&state, AgentKind::SqlGenerator, 2, None, None);
        assert!(payload.get("duration_ms").is_none());
        assert!(payload.get("error").is_none());
    }

    #[test]
    fn test_transition_payload() {
        let state = PipelineState::new("q", 3);
        let payload = transition_payload(
            &state,
            PipelineStage::SchemaAnalysis,
            PipelineStage::SqlGeneration,
            "schema_ready",
        );
        assert_eq!(payload["from"], "schema_analysis");
        assert_eq!(payload["to"], "sql_generation");
    }

    #[test]
    fn test_pipeline_payload_counts() {
        let state = PipelineState::new("q", 3);
        let payload = pipeline_payload(&state, 0, None);
        assert_eq!(payload["iterations"], 0);
        assert_eq!(payload["max_retries"], 3);
        assert!(payload.get("last_error").is_none());
    }
}
