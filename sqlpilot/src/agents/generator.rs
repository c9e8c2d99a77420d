//! SQL generation agent.

use super::{AgentKind, WorkerAgent};
use crate::errors::AgentError;
use crate::llm::{CompletionRequest, ModelClient};
use crate::state::{Message, PipelineState, StateDelta, UserContext};
use async_trait::async_trait;
use regex::Regex;
use std::fmt::{self, Write as _};
use std::sync::{Arc, LazyLock};

#[allow(clippy::expect_used)]
static FENCED_SQL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:sql)?\s*(.*?)```").expect("static fence pattern"));
#[allow(clippy::expect_used)]
static BARE_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\b(?:with\s+\w+\s+as\s*\(|select\b)[^;]*").expect("static statement pattern")
});

const SYSTEM_PROMPT: &str = "You are an expert SQL engineer. Write one read-only SQL query \
that answers the user's question.\n\
Rules:\n\
- Only SELECT (or WITH ... SELECT) statements. Never modify data or schema.\n\
- Use only the tables, columns and relationships listed in the schema.\n\
- Use the value mappings to translate natural-language terms into stored values.\n\
- Add a LIMIT clause unless the query aggregates to a handful of rows.\n\
- If previous attempts failed, fix the reported problems.\n\
Answer with the query inside a ```sql code block and nothing else.";

/// Pulls the SQL statement out of a model completion.
///
/// Prefers a fenced block; otherwise takes the first SELECT or WITH
/// statement. Trailing semicolons are dropped.
#[must_use]
pub fn extract_sql(completion: &str) -> Option<String> {
    let candidate = FENCED_SQL
        .captures(completion)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .or_else(|| BARE_STATEMENT.find(completion).map(|m| m.as_str()))?;

    let sql = candidate.trim().trim_end_matches(';').trim();
    (!sql.is_empty()).then(|| sql.to_string())
}

/// Asks the model for a SQL candidate.
pub struct SqlGeneratorAgent {
    model: Arc<dyn ModelClient>,
}

impl fmt::Debug for SqlGeneratorAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlGeneratorAgent")
            .field("model", &self.model.model_name())
            .finish()
    }
}

impl SqlGeneratorAgent {
    /// Creates the agent.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Builds the user message for `state`.
    #[must_use]
    pub fn build_context(request: &str, state: &PipelineState) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Question: {}", state.query());
        if !request.is_empty() && request != state.query() {
            let _ = writeln!(out, "Task: {request}");
        }

        if let Some(schema) = state.latest_schema() {
            let _ = write!(out, "\nSchema:\n{}", schema.to_prompt_text());
        }

        if let Some(analysis) = state.latest_analysis() {
            if !analysis.entities.is_empty() {
                let _ = writeln!(out, "\nEntities: {}", analysis.entities.join(", "));
            }
            if !analysis.aggregations.is_empty() {
                let _ = writeln!(out, "Aggregations: {}", analysis.aggregations.join(", "));
            }
            if !analysis.relationships.is_empty() {
                let _ = writeln!(out, "Relationships: {}", analysis.relationships.join("; "));
            }
        }

        if let Some(samples) = state.sample_retrieval_result() {
            if !samples.samples.is_empty() {
                out.push_str("\nReference examples:\n");
                for sample in &samples.samples {
                    let _ = writeln!(out, "Q: {}\nSQL: {}", sample.question, sample.sql);
                }
            }
        }

        let feedback = state.feedback_for_regeneration();
        if !feedback.is_empty() {
            if let Some(sql) = state.latest_sql() {
                let _ = writeln!(out, "\nPrevious attempt:\n{sql}");
            }
            out.push_str("Problems to fix:\n");
            for item in feedback {
                let _ = writeln!(out, "- {item}");
            }
        }
        out
    }
}

#[async_trait]
impl WorkerAgent for SqlGeneratorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::SqlGenerator
    }

    async fn invoke(
        &self,
        request: &str,
        state: &PipelineState,
        _ctx: &UserContext,
    ) -> Result<StateDelta, AgentError> {
        let name = self.kind().name();
        if state.latest_schema().is_none() {
            return Err(AgentError::missing_input(name, "schema"));
        }

        let completion = self
            .model
            .complete(
                CompletionRequest::new(SYSTEM_PROMPT)
                    .with_message(Message::user(Self::build_context(request, state))),
            )
            .await?;

        let sql = extract_sql(&completion.content).ok_or_else(|| {
            AgentError::InvalidResponse(format!(
                "no SQL statement in completion: {}",
                completion.content.chars().take(200).collect::<String>()
            ))
        })?;

        tracing::debug!(
            agent = name,
            sql_digest = %crate::utils::short_digest(&sql),
            total_tokens = completion.total_tokens(),
            "SQL generated"
        );

        Ok(StateDelta::new()
            .message(Message::assistant(format!("Generated SQL:\n{sql}")).with_name(name))
            .sql(sql))
    }
}
