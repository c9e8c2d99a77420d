//! Pipeline stage enum and the routing table between stages.

use crate::errors::StateMergeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The phase a pipeline run is in.
///
/// This is the sole driver of supervisor routing. The set is closed: any
/// other value arriving from an agent is a contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Find the tables relevant to the question.
    SchemaAnalysis,
    /// Fetch reference question/SQL pairs.
    SampleRetrieval,
    /// Ask the model for a SQL candidate.
    SqlGeneration,
    /// Run the static checks on the latest candidate.
    SqlValidation,
    /// Run the cleared SQL against the target database.
    SqlExecution,
    /// Terminal failure state.
    ErrorRecovery,
    /// Terminal success state.
    Completed,
}

impl PipelineStage {
    /// All stages, in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::SchemaAnalysis,
        Self::SampleRetrieval,
        Self::SqlGeneration,
        Self::SqlValidation,
        Self::SqlExecution,
        Self::ErrorRecovery,
        Self::Completed,
    ];

    /// Returns the wire name of the stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaAnalysis => "schema_analysis",
            Self::SampleRetrieval => "sample_retrieval",
            Self::SqlGeneration => "sql_generation",
            Self::SqlValidation => "sql_validation",
            Self::SqlExecution => "sql_execution",
            Self::ErrorRecovery => "error_recovery",
            Self::Completed => "completed",
        }
    }

    /// Returns true if no agent runs in this stage.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ErrorRecovery | Self::Completed)
    }

    /// Returns the stages that may follow this one.
    ///
    /// Every non-terminal stage may repeat itself (retry) and may escalate to
    /// error recovery.
    #[must_use]
    pub fn allowed_next(&self) -> &'static [PipelineStage] {
        use PipelineStage::{
            Completed, ErrorRecovery, SampleRetrieval, SchemaAnalysis, SqlExecution,
            SqlGeneration, SqlValidation,
        };
        match self {
            SchemaAnalysis => &[SchemaAnalysis, SampleRetrieval, SqlGeneration, ErrorRecovery],
            SampleRetrieval => &[SampleRetrieval, SqlGeneration, ErrorRecovery],
            SqlGeneration => &[SqlGeneration, SqlValidation, ErrorRecovery],
            SqlValidation => &[SqlValidation, SqlGeneration, SqlExecution, ErrorRecovery],
            SqlExecution => &[SqlExecution, SqlGeneration, Completed, ErrorRecovery],
            ErrorRecovery | Completed => &[],
        }
    }

    /// Returns true if `next` may follow this stage.
    #[must_use]
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Checks a transition against the routing table.
    pub fn check_transition(&self, next: PipelineStage) -> Result<(), StateMergeError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(StateMergeError::DisallowedTransition { from: *self, to: next })
        }
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::SchemaAnalysis
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = StateMergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s.trim())
            .ok_or_else(|| StateMergeError::InvalidStage(s.to_string()))
    }
}

/// A stage value proposed by an agent delta.
///
/// Agents that talk to a model may receive free-form stage names; they are
/// carried unparsed until the supervisor merges the delta, where unknown
/// names are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageProposal {
    /// A recognised stage.
    Known(PipelineStage),
    /// A name outside the stage set.
    Unrecognized(String),
}

impl StageProposal {
    /// Parses a stage name, keeping unknown names for later rejection.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        name.parse::<PipelineStage>()
            .map_or_else(|_| Self::Unrecognized(name.to_string()), Self::Known)
    }

    /// Resolves the proposal to a stage.
    pub fn resolve(&self) -> Result<PipelineStage, StateMergeError> {
        match self {
            Self::Known(stage) => Ok(*stage),
            Self::Unrecognized(name) => Err(StateMergeError::InvalidStage(name.clone())),
        }
    }
}

impl From<PipelineStage> for StageProposal {
    fn from(stage: PipelineStage) -> Self {
        Self::Known(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_round_trips_through_from_str() {
        for stage in PipelineStage::ALL {
            assert_eq!(stage.to_string().parse::<PipelineStage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let err = "charting".parse::<PipelineStage>().unwrap_err();
        assert_eq!(err, StateMergeError::InvalidStage("charting".to_string()));
    }

    #[test]
    fn test_stage_serialize() {
        let json = serde_json::to_string(&PipelineStage::SqlValidation).unwrap();
        assert_eq!(json, r#""sql_validation""#);
    }

    #[test]
    fn test_terminal_stages_have_no_successors() {
        assert!(PipelineStage::Completed.allowed_next().is_empty());
        assert!(PipelineStage::ErrorRecovery.allowed_next().is_empty());
        assert!(!PipelineStage::SqlExecution.is_terminal());
    }

    #[test]
    fn test_every_active_stage_can_escalate() {
        for stage in PipelineStage::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(stage.can_transition_to(PipelineStage::ErrorRecovery), "{stage}");
            assert!(stage.can_transition_to(*stage), "{stage}");
        }
    }

    #[test]
    fn test_generation_cannot_skip_validation() {
        let err = PipelineStage::SqlGeneration
            .check_transition(PipelineStage::SqlExecution)
            .unwrap_err();
        assert!(matches!(err, StateMergeError::DisallowedTransition { .. }));
    }

    #[test]
    fn test_stage_proposal_parse() {
        assert_eq!(
            StageProposal::parse("sql_execution"),
            StageProposal::Known(PipelineStage::SqlExecution)
        );
        assert!(StageProposal::parse("chart_generation").resolve().is_err());
    }
}
