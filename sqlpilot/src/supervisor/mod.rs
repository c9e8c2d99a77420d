//! The supervisor control loop.
//!
//! One run is a loop over [`PipelineStage`]: pick the agent for the current
//! stage, call it under a timeout, merge its delta, and route. Exactly one
//! agent runs per iteration and the state is written only here.
//!
//! Every failure becomes an entry in the error history. Agent failures spend
//! retry budget; merge violations and the iteration ceiling escalate straight
//! to `error_recovery`.

mod routing;

use crate::agents::{wants_chart, AgentKind, WorkerAgent};
use crate::config::PipelineConfig;
use crate::core::{PipelineOutcome, PipelineStage, StageProposal};
use crate::errors::{AgentError, ErrorInfo, StateMergeError};
use crate::events::{event_types, EventSink, NoOpEventSink};
use crate::observability::{agent_payload, pipeline_payload, transition_payload, SpanTimer};
use crate::state::{ErrorRecord, Message, PipelineState, StateDelta, UserContext};
use futures::FutureExt;
use routing::{Attempt, Decision, RouteContext};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SUPERVISOR: &str = "supervisor";

/// The worker agents a supervisor dispatches to.
#[derive(Clone)]
pub struct Agents {
    /// Schema analysis.
    pub schema: Arc<dyn WorkerAgent>,
    /// Optional sample lookup between schema analysis and generation.
    pub sample: Option<Arc<dyn WorkerAgent>>,
    /// SQL generation.
    pub generator: Arc<dyn WorkerAgent>,
    /// SQL validation.
    pub validator: Arc<dyn WorkerAgent>,
    /// SQL execution.
    pub executor: Arc<dyn WorkerAgent>,
    /// Optional chart building after execution.
    pub chart: Option<Arc<dyn WorkerAgent>>,
}

impl fmt::Debug for Agents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agents")
            .field("schema", &self.schema)
            .field("sample", &self.sample)
            .field("generator", &self.generator)
            .field("validator", &self.validator)
            .field("executor", &self.executor)
            .field("chart", &self.chart)
            .finish()
    }
}

impl Agents {
    /// Creates the required agents; the sample and chart hops start disabled.
    #[must_use]
    pub fn new(
        schema: Arc<dyn WorkerAgent>,
        generator: Arc<dyn WorkerAgent>,
        validator: Arc<dyn WorkerAgent>,
        executor: Arc<dyn WorkerAgent>,
    ) -> Self {
        Self {
            schema,
            sample: None,
            generator,
            validator,
            executor,
            chart: None,
        }
    }

    /// Adds the sample retrieval agent.
    #[must_use]
    pub fn with_sample(mut self, agent: Arc<dyn WorkerAgent>) -> Self {
        self.sample = Some(agent);
        self
    }

    /// Adds the chart agent.
    #[must_use]
    pub fn with_chart(mut self, agent: Arc<dyn WorkerAgent>) -> Self {
        self.chart = Some(agent);
        self
    }

    fn get(&self, kind: AgentKind) -> Option<&Arc<dyn WorkerAgent>> {
        match kind {
            AgentKind::Schema => Some(&self.schema),
            AgentKind::SampleRetrieval => self.sample.as_ref(),
            AgentKind::SqlGenerator => Some(&self.generator),
            AgentKind::SqlValidator => Some(&self.validator),
            AgentKind::SqlExecutor => Some(&self.executor),
            AgentKind::Chart => self.chart.as_ref(),
        }
    }
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct SupervisorRun {
    /// The final state; its stage is terminal.
    pub state: PipelineState,
    /// Loop iterations used.
    pub iterations: u32,
    /// Wall-clock duration.
    pub duration_ms: f64,
}

impl SupervisorRun {
    /// The caller-facing outcome.
    #[must_use]
    pub fn outcome(&self) -> PipelineOutcome {
        PipelineOutcome::from_state(&self.state, self.iterations)
    }
}

/// Loop bookkeeping that lives outside the state.
#[derive(Debug, Default)]
struct Progress {
    iterations: u32,
    fix_passes: u32,
    awaiting_chart: bool,
}

/// Drives runs through the stage machine.
pub struct Supervisor {
    agents: Agents,
    config: PipelineConfig,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("agents", &self.agents)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor that discards events.
    #[must_use]
    pub fn new(agents: Agents, config: PipelineConfig) -> Self {
        Self {
            agents,
            config,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn samples_enabled(&self) -> bool {
        self.config.sample_retrieval_enabled && self.agents.sample.is_some()
    }

    /// Revalidation passes per generated SQL. At least one, so a patch of
    /// already cleared SQL is always checked again.
    fn fix_pass_limit(&self) -> u32 {
        self.config.max_retries.max(1)
    }

    /// Runs one question to a terminal stage.
    pub async fn run(&self, query: &str, ctx: &UserContext) -> SupervisorRun {
        let timer = SpanTimer::start("pipeline");
        let mut state = PipelineState::new(query, self.config.max_retries);
        let mut progress = Progress::default();

        info!(
            run_id = %state.run_id(),
            connection_id = ctx.connection_id,
            max_retries = self.config.max_retries,
            "Pipeline started"
        );
        self.events
            .emit(event_types::PIPELINE_STARTED, Some(pipeline_payload(&state, 0, None)))
            .await;

        while !state.current_stage().is_terminal() {
            if progress.iterations >= self.config.max_iterations {
                let message = format!(
                    "Iteration limit of {} reached in stage {}",
                    self.config.max_iterations,
                    state.current_stage()
                );
                self.escalate(&mut state, SUPERVISOR, "iteration_limit", message).await;
                break;
            }
            progress.iterations += 1;
            self.step(&mut state, ctx, &mut progress).await;
        }

        let duration_ms = timer.finish();
        let payload = pipeline_payload(&state, progress.iterations, Some(duration_ms));
        if state.current_stage() == PipelineStage::Completed {
            info!(
                run_id = %state.run_id(),
                iterations = progress.iterations,
                retry_count = state.retry_count(),
                duration_ms,
                "Pipeline completed"
            );
            self.events.emit(event_types::PIPELINE_COMPLETED, Some(payload)).await;
        } else {
            warn!(
                run_id = %state.run_id(),
                iterations = progress.iterations,
                retry_count = state.retry_count(),
                last_error = state.last_error().map(ErrorRecord::summary).unwrap_or_default(),
                "Pipeline failed"
            );
            self.events.emit(event_types::PIPELINE_FAILED, Some(payload)).await;
        }

        SupervisorRun {
            state,
            iterations: progress.iterations,
            duration_ms,
        }
    }

    /// One loop iteration: one agent call, one merge, one routing decision.
    async fn step(&self, state: &mut PipelineState, ctx: &UserContext, progress: &mut Progress) {
        let stage = state.current_stage();
        let Some(kind) = routing::agent_for(stage, progress.awaiting_chart) else {
            return;
        };
        progress.awaiting_chart = false;

        let request = routing::request_for(kind, state);
        let audit = Message::user(request.clone()).with_name(kind.name());

        let uncleared = kind == AgentKind::SqlExecutor
            && !state
                .latest_sql()
                .is_some_and(|sql| state.is_cleared_for_execution(sql));

        let result = match self.agents.get(kind) {
            _ if uncleared => Err(AgentError::Rejected(
                state.latest_sql().unwrap_or("<none>").to_string(),
            )),
            Some(agent) => self.invoke(agent.as_ref(), &request, state, ctx, progress.iterations).await,
            None => Err(AgentError::missing_input(SUPERVISOR, format!("no {kind} configured"))),
        };

        let (attempt_err, proposal, new_sql, new_execution) = match result {
            Ok(mut delta) => {
                let proposal = match delta.current_stage.take() {
                    Some(StageProposal::Unrecognized(name)) => {
                        delta.current_stage = Some(StageProposal::Unrecognized(name));
                        None
                    }
                    Some(StageProposal::Known(proposed)) => Some(proposed),
                    None => None,
                };
                let new_sql = !delta.generated_sql.is_empty();
                let new_execution = !delta.execution_results.is_empty();
                let delta = StateDelta::new().message(audit).combine(delta);
                if let Err(err) = state.apply(delta) {
                    self.reject_delta(state, kind, &err).await;
                    return;
                }
                (None, proposal, new_sql, new_execution)
            }
            Err(err) => {
                if let Err(merge_err) = state.apply(StateDelta::new().message(audit)) {
                    self.reject_delta(state, kind, &merge_err).await;
                    return;
                }
                (Some(err), None, false, false)
            }
        };

        let route = RouteContext {
            samples_enabled: self.samples_enabled(),
            chart_wanted: kind == AgentKind::SqlExecutor
                && self.agents.chart.is_some()
                && wants_chart(state, &self.config),
            fix_passes: progress.fix_passes,
            max_fix_passes: self.fix_pass_limit(),
        };
        let attempt = match &attempt_err {
            Some(err) => Attempt::Failed(err),
            None => Attempt::Merged {
                new_sql,
                new_execution,
            },
        };
        let mut decision = routing::decide(kind, &attempt, state, route);

        if let Some(proposed) = proposal {
            decision = self.reconcile(state, decision, proposed).await;
        }

        match &decision {
            Decision::Goto { to: PipelineStage::SqlValidation, .. } if kind == AgentKind::SqlGenerator => {
                progress.fix_passes = 0;
            }
            Decision::Revalidate => progress.fix_passes += 1,
            Decision::AwaitChart => progress.awaiting_chart = true,
            _ => {}
        }

        self.apply_decision(state, kind, decision).await;
    }

    /// Calls an agent under the agent timeout, turning panics into errors.
    async fn invoke(
        &self,
        agent: &dyn WorkerAgent,
        request: &str,
        state: &PipelineState,
        ctx: &UserContext,
        iteration: u32,
    ) -> Result<StateDelta, AgentError> {
        let kind = agent.kind();
        debug!(
            run_id = %state.run_id(),
            agent = kind.name(),
            stage = %state.current_stage(),
            iteration,
            "Invoking agent"
        );
        self.events
            .emit(
                event_types::AGENT_INVOKED,
                Some(agent_payload(state, kind, iteration, None, None)),
            )
            .await;

        let timer = SpanTimer::start(kind.name());
        let guarded = AssertUnwindSafe(agent.invoke(request, state, ctx)).catch_unwind();
        let result = match tokio::time::timeout(self.config.agent_timeout(), guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(AgentError::Panicked {
                agent: kind.name().to_string(),
                message: panic_message(payload.as_ref()),
            }),
            Err(_) => Err(AgentError::Timeout {
                agent: kind.name().to_string(),
                timeout_ms: self.config.agent_timeout_ms,
            }),
        };
        let duration_ms = timer.finish();

        match &result {
            Ok(delta) => {
                debug!(
                    run_id = %state.run_id(),
                    agent = kind.name(),
                    duration_ms,
                    fields = ?delta.touched_fields(),
                    "Agent succeeded"
                );
                self.events
                    .emit(
                        event_types::AGENT_SUCCEEDED,
                        Some(agent_payload(state, kind, iteration, Some(duration_ms), None)),
                    )
                    .await;
            }
            Err(err) => {
                warn!(
                    run_id = %state.run_id(),
                    agent = kind.name(),
                    stage = %state.current_stage(),
                    retry_count = state.retry_count(),
                    duration_ms,
                    error = %err,
                    "Agent failed"
                );
                self.events
                    .emit(
                        event_types::AGENT_FAILED,
                        Some(agent_payload(state, kind, iteration, Some(duration_ms), Some(err))),
                    )
                    .await;
            }
        }
        result
    }

    /// Lets an agent's stage proposal override a plain advance when the
    /// routing table allows it. Anything else is clamped.
    async fn reconcile(&self, state: &PipelineState, decision: Decision, proposed: PipelineStage) -> Decision {
        let current = state.current_stage();
        let default_target = decision.target(current);
        if proposed == default_target {
            return decision;
        }
        if matches!(decision, Decision::Goto { .. }) && current.can_transition_to(proposed) {
            return Decision::Goto {
                to: proposed,
                reason: "agent_proposal",
            };
        }

        info!(
            run_id = %state.run_id(),
            stage = %current,
            proposed = %proposed,
            routed = %default_target,
            "Clamped stage proposal"
        );
        self.events
            .emit(
                event_types::STAGE_CLAMPED,
                Some(transition_payload(state, current, proposed, "not_allowed")),
            )
            .await;
        decision
    }

    async fn apply_decision(&self, state: &mut PipelineState, kind: AgentKind, decision: Decision) {
        let current = state.current_stage();
        let source = kind.name();
        let (delta, reason) = match decision {
            Decision::Goto { to, reason } => (StateDelta::new().stage(to), reason),
            Decision::Revalidate => (StateDelta::new(), "revalidate"),
            Decision::AwaitChart => (StateDelta::new(), "await_chart"),
            Decision::Tolerate { to, kind, message } => (
                StateDelta::new()
                    .error(ErrorRecord::new(source, current, kind, message))
                    .stage(to),
                "tolerated_failure",
            ),
            Decision::Fail {
                retry_at,
                kind,
                message,
            } => {
                let retry_count = state.retry_count() + 1;
                let exhausted = retry_count >= state.max_retries();
                let to = if exhausted { PipelineStage::ErrorRecovery } else { retry_at };
                (
                    StateDelta::new()
                        .error(ErrorRecord::new(source, current, kind, message))
                        .retry_count(retry_count.min(state.max_retries()))
                        .stage(to),
                    if exhausted { "retry_budget_exhausted" } else { "retry" },
                )
            }
        };

        if let Err(err) = state.apply(delta) {
            let info = ErrorInfo::from(&err);
            self.escalate(state, SUPERVISOR, &info.kind, info.message).await;
            return;
        }
        self.note_transition(state, current, reason).await;
    }

    async fn note_transition(&self, state: &PipelineState, from: PipelineStage, reason: &str) {
        let to = state.current_stage();
        if to == from {
            return;
        }
        debug!(
            run_id = %state.run_id(),
            from = %from,
            to = %to,
            reason,
            retry_count = state.retry_count(),
            "Stage transition"
        );
        self.events
            .emit(
                event_types::STAGE_TRANSITION,
                Some(transition_payload(state, from, to, reason)),
            )
            .await;
    }

    /// A delta broke the merge protocol: drop it and escalate.
    async fn reject_delta(&self, state: &mut PipelineState, kind: AgentKind, err: &StateMergeError) {
        error!(
            run_id = %state.run_id(),
            agent = kind.name(),
            stage = %state.current_stage(),
            error = %err,
            "Rejected agent delta"
        );
        let info = ErrorInfo::from(err);
        self.escalate(state, kind.name(), &info.kind, info.message).await;
    }

    /// Moves straight to error recovery without spending retry budget.
    async fn escalate(&self, state: &mut PipelineState, source: &str, kind: &str, message: String) {
        let from = state.current_stage();
        let delta = StateDelta::new()
            .error(ErrorRecord::new(source, from, kind, message))
            .stage(PipelineStage::ErrorRecovery);
        if let Err(err) = state.apply(delta) {
            error!(run_id = %state.run_id(), error = %err, "Could not escalate to error recovery");
            return;
        }
        self.note_transition(state, from, kind).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
