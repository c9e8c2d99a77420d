//! Scripted collaborators for driving the supervisor in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::agents::{AgentKind, QueryExecutor, QueryResult, WorkerAgent};
use crate::core::PipelineStage;
use crate::errors::{AgentError, ModelError};
use crate::llm::{CompletionRequest, CompletionResponse, ModelClient};
use crate::state::{PipelineState, StateDelta, UserContext};
use crate::utils::normalize_sql;

/// One scripted reply of a [`ScriptedAgent`].
#[derive(Debug)]
pub enum Step {
    /// Return this delta.
    Reply(StateDelta),
    /// Fail with this error.
    Fail(AgentError),
    /// Panic with this message.
    Panic(String),
    /// Sleep, then return an empty delta.
    Hang(Duration),
}

/// A call received by a [`ScriptedAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// The supervisor's request.
    pub request: String,
    /// The stage the run was in.
    pub stage: PipelineStage,
    /// Retries spent at call time.
    pub retry_count: u32,
}

/// A worker agent that replays queued steps and records its calls.
///
/// Once the queue is empty it keeps answering with the fallback step,
/// an empty delta unless set otherwise.
#[derive(Debug)]
pub struct ScriptedAgent {
    kind: AgentKind,
    steps: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<StateDelta>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedAgent {
    /// Creates an agent with an empty script.
    #[must_use]
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            steps: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Some(StateDelta::new())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a delta.
    #[must_use]
    pub fn then_reply(self, delta: StateDelta) -> Self {
        self.steps.lock().push_back(Step::Reply(delta));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn then_fail(self, error: AgentError) -> Self {
        self.steps.lock().push_back(Step::Fail(error));
        self
    }

    /// Queues a panic.
    #[must_use]
    pub fn then_panic(self, message: impl Into<String>) -> Self {
        self.steps.lock().push_back(Step::Panic(message.into()));
        self
    }

    /// Queues a sleep.
    #[must_use]
    pub fn then_hang(self, duration: Duration) -> Self {
        self.steps.lock().push_back(Step::Hang(duration));
        self
    }

    /// Sets the reply used once the script runs out; `None` fails instead.
    #[must_use]
    pub fn otherwise(self, fallback: Option<StateDelta>) -> Self {
        *self.fallback.lock() = fallback;
        self
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_step(&self) -> Step {
        if let Some(step) = self.steps.lock().pop_front() {
            return step;
        }
        match self.fallback.lock().clone() {
            Some(delta) => Step::Reply(delta),
            None => Step::Fail(AgentError::tool(self.kind.name(), "script", "script exhausted")),
        }
    }
}

#[async_trait]
impl WorkerAgent for ScriptedAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn invoke(
        &self,
        request: &str,
        state: &PipelineState,
        _ctx: &UserContext,
    ) -> Result<StateDelta, AgentError> {
        self.calls.lock().push(RecordedCall {
            request: request.to_string(),
            stage: state.current_stage(),
            retry_count: state.retry_count(),
        });
        match self.next_step() {
            Step::Reply(delta) => Ok(delta),
            Step::Fail(error) => Err(error),
            Step::Panic(message) => panic!("{message}"),
            Step::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(StateDelta::new())
            }
        }
    }
}

/// A model client answering from a queue of canned completions.
///
/// The last completion repeats once the queue is down to one entry.
#[derive(Debug, Default)]
pub struct StubModelClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<CompletionRequest>>,
}

impl StubModelClient {
    /// Creates a client with no replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a completion.
    #[must_use]
    pub fn then_complete(self, content: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(content.into()));
        self
    }

    /// Queues a transport failure.
    #[must_use]
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.replies.lock().push_back(Err(message.into()));
        self
    }

    /// Requests received so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<CompletionRequest> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ModelClient for StubModelClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        self.prompts.lock().push(request);
        let reply = {
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        match reply {
            Some(Ok(content)) => Ok(CompletionResponse::text(content)),
            Some(Err(message)) => Err(ModelError::Http(message)),
            None => Err(ModelError::NotConfigured("no stub completion queued".to_string())),
        }
    }

    fn model_name(&self) -> String {
        "stub".to_string()
    }
}

/// A query executor answering from a fixed table of results.
///
/// SQL is matched after whitespace normalization. Unknown SQL gets the
/// default result, or a runtime error if none is set.
#[derive(Debug, Default)]
pub struct StaticQueryExecutor {
    results: HashMap<String, QueryResult>,
    default: Option<QueryResult>,
    unreachable: Option<String>,
    executed: Mutex<Vec<String>>,
}

impl StaticQueryExecutor {
    /// Creates an executor with no results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `sql` with `result`.
    #[must_use]
    pub fn with_result(mut self, sql: &str, result: QueryResult) -> Self {
        self.results.insert(normalize_sql(sql), result);
        self
    }

    /// Answers unknown SQL with `result`.
    #[must_use]
    pub fn with_default(mut self, result: QueryResult) -> Self {
        self.default = Some(result);
        self
    }

    /// Fails every call as if the database were down.
    #[must_use]
    pub fn unreachable(mut self, reason: impl Into<String>) -> Self {
        self.unreachable = Some(reason.into());
        self
    }

    /// SQL received so far.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl QueryExecutor for StaticQueryExecutor {
    async fn execute_query(&self, _connection_id: i64, sql: &str) -> anyhow::Result<QueryResult> {
        self.executed.lock().push(sql.to_string());
        if let Some(reason) = &self.unreachable {
            anyhow::bail!("{reason}");
        }
        Ok(self
            .results
            .get(&normalize_sql(sql))
            .or(self.default.as_ref())
            .cloned()
            .unwrap_or_else(|| QueryResult::failed(format!("no result registered for: {sql}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_agent_replays_then_falls_back() {
        let agent = ScriptedAgent::new(AgentKind::Schema)
            .then_fail(AgentError::EmptySchema { connection_id: 1 })
            .then_reply(StateDelta::new().sql("SELECT 1"));
        let state = PipelineState::new("q", 3);
        let ctx = UserContext::new(1);

        assert!(agent.invoke("a", &state, &ctx).await.is_err());
        assert_eq!(agent.invoke("b", &state, &ctx).await.unwrap().generated_sql, vec!["SELECT 1"]);
        assert!(agent.invoke("c", &state, &ctx).await.unwrap().is_empty());
        assert_eq!(agent.call_count(), 3);
        assert_eq!(agent.calls()[1].request, "b");
    }

    #[tokio::test]
    async fn test_scripted_agent_without_fallback_fails() {
        let agent = ScriptedAgent::new(AgentKind::Chart).otherwise(None);
        let err = agent
            .invoke("x", &PipelineState::new("q", 3), &UserContext::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool");
    }

    #[tokio::test]
    async fn test_stub_model_repeats_last_reply() {
        let model = StubModelClient::new().then_fail("reset").then_complete("SELECT 1");
        let request = CompletionRequest::new("system");

        assert!(model.complete(request.clone()).await.is_err());
        assert_eq!(model.complete(request.clone()).await.unwrap().content, "SELECT 1");
        assert_eq!(model.complete(request).await.unwrap().content, "SELECT 1");
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_static_executor_matches_normalized_sql() {
        let executor = StaticQueryExecutor::new().with_result(
            "SELECT COUNT(*) FROM teachers",
            QueryResult::rows(vec!["n".to_string()], vec![vec![json!(4)]]),
        );
        let hit = executor
            .execute_query(1, "SELECT  COUNT(*)\nFROM teachers")
            .await
            .unwrap();
        assert_eq!(hit.row_count(), 1);

        let miss = executor.execute_query(1, "SELECT 2").await.unwrap();
        assert!(!miss.is_ok());
        assert_eq!(executor.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_executor_errors() {
        let executor = StaticQueryExecutor::new().unreachable("connection refused");
        let err = executor.execute_query(1, "SELECT 1").await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }
}
