//! Collaborator interfaces used by the worker agents.
//!
//! Implementations live outside the pipeline (database drivers, vector
//! stores, catalog services). They report failures with `anyhow`; the agents
//! turn those into [`AgentError`](crate::errors::AgentError)s.

use crate::state::{QueryAnalysis, QuerySample, SchemaInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Column value mappings: `table.column` to term to stored value.
pub type ValueMappings = BTreeMap<String, BTreeMap<String, String>>;

/// Read-only schema lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchemaRetriever: Send + Sync {
    /// Tables and relationships relevant to `query`.
    async fn retrieve_schema(&self, connection_id: i64, query: &str) -> anyhow::Result<SchemaInfo>;

    /// Value mappings for the named tables.
    async fn get_value_mappings(
        &self,
        connection_id: i64,
        tables: &[String],
    ) -> anyhow::Result<ValueMappings>;
}

/// Rows returned by a query, or the database's error for it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names.
    pub columns: Vec<String>,
    /// Positional rows.
    pub rows: Vec<Vec<Value>>,
    /// Runtime error reported by the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// A successful result.
    #[must_use]
    pub fn rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            error: None,
        }
    }

    /// A runtime failure.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the database reported no error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs SQL against a target database.
///
/// Ordinary SQL runtime failures come back as a [`QueryResult`] with `error`
/// set. `Err` is reserved for infrastructure failures such as an unreachable
/// database. The connection is acquired and released inside the call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `sql` on `connection_id`.
    async fn execute_query(&self, connection_id: i64, sql: &str) -> anyhow::Result<QueryResult>;
}

/// Looks up reference question/SQL pairs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SampleRetriever: Send + Sync {
    /// Up to `limit` samples similar to `query`, best first.
    async fn retrieve_samples(
        &self,
        connection_id: i64,
        query: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<QuerySample>>;
}

/// Extracts intent from a question.
#[cfg_attr(test, mockall::automock)]
pub trait QueryAnalyzer: Send + Sync {
    /// Analyses `query`.
    fn analyze(&self, query: &str) -> QueryAnalysis;
}
