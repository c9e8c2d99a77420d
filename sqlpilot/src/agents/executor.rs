//! SQL execution agent.

use super::formatting::{execution_suggestions, format_rows, performance_rating, ResultFormat};
use super::ports::QueryExecutor;
use super::{AgentKind, WorkerAgent};
use crate::errors::AgentError;
use crate::state::{ExecutionRecord, Message, PipelineState, StateDelta, UserContext};
use crate::utils::{elapsed_ms, short_digest};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MALFORMED_MARKERS: &[&str] = &[
    "syntax",
    "no such",
    "does not exist",
    "unknown column",
    "column",
    "ambiguous",
];

/// Returns true if a database error points at the SQL text rather than the
/// infrastructure, so regenerating the query is the right recovery.
#[must_use]
pub fn looks_malformed(error: &str) -> bool {
    let lowered = error.to_lowercase();
    MALFORMED_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Runs cleared SQL through the [`QueryExecutor`].
pub struct SqlExecutorAgent {
    executor: Arc<dyn QueryExecutor>,
    query_timeout: Duration,
    format: ResultFormat,
    preview_rows: usize,
}

impl fmt::Debug for SqlExecutorAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlExecutorAgent")
            .field("query_timeout", &self.query_timeout)
            .field("format", &self.format)
            .field("preview_rows", &self.preview_rows)
            .finish_non_exhaustive()
    }
}

impl SqlExecutorAgent {
    /// Creates the agent with a 30s query timeout and table output.
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            query_timeout: Duration::from_secs(30),
            format: ResultFormat::Table,
            preview_rows: 10,
        }
    }

    /// Sets the query timeout.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the result rendering.
    #[must_use]
    pub fn with_format(mut self, format: ResultFormat, preview_rows: usize) -> Self {
        self.format = format;
        self.preview_rows = preview_rows;
        self
    }
}

#[async_trait]
impl WorkerAgent for SqlExecutorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::SqlExecutor
    }

    async fn invoke(
        &self,
        _request: &str,
        state: &PipelineState,
        ctx: &UserContext,
    ) -> Result<StateDelta, AgentError> {
        let name = self.kind().name();
        let sql = state
            .latest_sql()
            .ok_or_else(|| AgentError::missing_input(name, "generated SQL"))?;
        if !state.is_cleared_for_execution(sql) {
            return Err(AgentError::Rejected(sql.to_string()));
        }

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.query_timeout,
            self.executor.execute_query(ctx.connection_id, sql),
        )
        .await
        .map_err(|_| AgentError::Timeout {
            agent: name.to_string(),
            timeout_ms: u64::try_from(self.query_timeout.as_millis()).unwrap_or(u64::MAX),
        })?
        .map_err(|e| AgentError::tool(name, "execute_sql_query", format!("{e:#}")))?;
        let execution_time_ms = elapsed_ms(start);

        if let Some(error) = result.error {
            tracing::info!(
                agent = name,
                sql_digest = %short_digest(sql),
                error = %error,
                "Query failed"
            );
            let summary = format!("Query failed: {error}");
            return Ok(StateDelta::new()
                .execution(ExecutionRecord::failed(sql, error, execution_time_ms))
                .message(Message::assistant(summary).with_name(name)));
        }

        let row_count = result.rows.len();
        let formatted = format_rows(&result.columns, &result.rows, self.format, self.preview_rows);
        let record = ExecutionRecord {
            sql: sql.to_string(),
            success: true,
            columns: result.columns,
            rows: Some(result.rows),
            error: None,
            execution_time_ms,
            row_count,
            formatted: Some(formatted),
            format_type: Some(self.format.to_string()),
            performance_rating: Some(performance_rating(execution_time_ms).to_string()),
            suggestions: execution_suggestions(execution_time_ms, row_count),
        };

        tracing::info!(
            agent = name,
            sql_digest = %short_digest(sql),
            row_count,
            duration_ms = execution_time_ms,
            "Query executed"
        );

        Ok(StateDelta::new()
            .message(Message::assistant(format!("Query returned {row_count} row(s)")).with_name(name))
            .execution(record))
    }
}
