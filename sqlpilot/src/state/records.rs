//! Entry types stored in the accumulating fields of [`PipelineState`].
//!
//! [`PipelineState`]: super::PipelineState

use crate::core::PipelineStage;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A message in the run's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role (e.g., "user", "assistant", "system", "tool").
    pub role: String,
    /// The message content.
    pub content: String,
    /// The agent or tool that produced the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Correlates a tool reply with the call that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Optional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Creates a new message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            name: None,
            tool_call_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Creates a tool reply.
    #[must_use]
    pub fn tool(name: impl Into<String>, tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new("tool", content)
        }
    }

    /// Tags the message with the producing agent or tool.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Intent extracted from a natural-language question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// The raw question this analysis belongs to.
    pub query: String,
    /// Content words that likely name tables or columns.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Phrases linking entities ("per", "of", "by").
    #[serde(default)]
    pub relationships: Vec<String>,
    /// Aggregations implied by the question (count, sum, avg, ...).
    #[serde(default)]
    pub aggregations: Vec<String>,
    /// The question refers to time or trends.
    #[serde(default)]
    pub has_time_dimension: bool,
    /// The question compares groups.
    #[serde(default)]
    pub has_comparison: bool,
    /// The question asks for a chart or a visual shape of the data.
    #[serde(default)]
    pub wants_visualization: bool,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Database type name.
    pub data_type: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
    /// References another table.
    #[serde(default)]
    pub is_foreign_key: bool,
}

impl ColumnInfo {
    /// Creates a column.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ..Default::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the column as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Marks the column as foreign key.
    #[must_use]
    pub fn foreign_key(mut self) -> Self {
        self.is_foreign_key = true;
        self
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Creates a table with no columns.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a column.
    #[must_use]
    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }
}

/// A foreign-key-like link between two columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Referencing table.
    pub source_table: String,
    /// Referencing column.
    pub source_column: String,
    /// Referenced table.
    pub target_table: String,
    /// Referenced column.
    pub target_column: String,
    /// e.g. "many_to_one".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
}

impl Relationship {
    /// Creates a relationship `source_table.source_column -> target_table.target_column`.
    #[must_use]
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            source_column: source_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
            relationship_type: None,
        }
    }

    /// Returns true if the relationship touches the table.
    #[must_use]
    pub fn involves(&self, table: &str) -> bool {
        self.source_table.eq_ignore_ascii_case(table) || self.target_table.eq_ignore_ascii_case(table)
    }
}

/// Schema context retrieved for one question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Tables keyed by name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableInfo>,
    /// Links between the tables.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// `table.column` to natural-language term to stored value.
    #[serde(default)]
    pub value_mappings: BTreeMap<String, BTreeMap<String, String>>,
}

impl SchemaInfo {
    /// Returns true if no table was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Renders the schema as compact DDL-like text for prompts.
    #[must_use]
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for table in self.tables.values() {
            out.push_str(&format!("TABLE {}", table.name));
            if let Some(desc) = &table.description {
                out.push_str(&format!(" -- {desc}"));
            }
            out.push('\n');
            for col in &table.columns {
                out.push_str(&format!("  {} {}", col.name, col.data_type));
                if col.is_primary_key {
                    out.push_str(" PRIMARY KEY");
                }
                if let Some(desc) = &col.description {
                    out.push_str(&format!(" -- {desc}"));
                }
                out.push('\n');
            }
        }
        if !self.relationships.is_empty() {
            out.push_str("RELATIONSHIPS\n");
            for rel in &self.relationships {
                out.push_str(&format!(
                    "  {}.{} -> {}.{}\n",
                    rel.source_table, rel.source_column, rel.target_table, rel.target_column
                ));
            }
        }
        if !self.value_mappings.is_empty() {
            out.push_str("VALUE MAPPINGS\n");
            for (column, terms) in &self.value_mappings {
                for (term, value) in terms {
                    out.push_str(&format!("  {column}: '{term}' => '{value}'\n"));
                }
            }
        }
        out
    }
}

/// A reference question/SQL pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySample {
    /// Natural-language question.
    pub question: String,
    /// SQL answering it.
    pub sql: String,
    /// Similarity to the current question.
    #[serde(default)]
    pub score: f64,
}

/// Output of the sample retrieval hop.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleRetrievalResult {
    /// Retrieved samples, best first.
    #[serde(default)]
    pub samples: Vec<QuerySample>,
}

/// Which check produced a validation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// Parser and keyword checks.
    Syntax,
    /// Injection heuristics.
    Security,
    /// Query-shape heuristics.
    Performance,
    /// Auto-fix pass.
    Fix,
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Security => write!(f, "security"),
            Self::Performance => write!(f, "performance"),
            Self::Fix => write!(f, "fix"),
        }
    }
}

/// Outcome of one validation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// The check that produced this record.
    pub kind: ValidationKind,
    /// The SQL that was checked.
    pub sql: String,
    /// sha256 of `sql`.
    pub sql_digest: String,
    /// The check itself ran to completion.
    pub success: bool,
    /// No syntax errors.
    pub is_valid: bool,
    /// No security issues.
    pub is_secure: bool,
    /// Hard errors.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Non-fatal findings.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Improvement hints.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Injection findings.
    #[serde(default)]
    pub security_issues: Vec<String>,
    /// Performance findings that count against the score.
    #[serde(default)]
    pub performance_issues: Vec<String>,
    /// 0-100, performance records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_score: Option<u8>,
    /// Patched SQL, fix records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_sql: Option<String>,
    /// Repairs performed, fix records only.
    #[serde(default)]
    pub fixes_applied: Vec<String>,
}

impl ValidationRecord {
    /// Creates a passing record for `sql`.
    #[must_use]
    pub fn new(kind: ValidationKind, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            kind,
            sql_digest: crate::utils::sql_digest(&sql),
            sql,
            success: true,
            is_valid: true,
            is_secure: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            security_issues: Vec::new(),
            performance_issues: Vec::new(),
            performance_score: None,
            fixed_sql: None,
            fixes_applied: Vec::new(),
        }
    }

    /// Returns true if this record judged exactly `sql`.
    #[must_use]
    pub fn judges(&self, sql: &str) -> bool {
        self.sql_digest == crate::utils::sql_digest(sql)
    }
}

/// Outcome of running one SQL statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The SQL that ran.
    pub sql: String,
    /// The statement ran without error.
    pub success: bool,
    /// Column names in result order.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Result rows, positional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<serde_json::Value>>>,
    /// Runtime error reported by the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time.
    #[serde(default)]
    pub execution_time_ms: f64,
    /// Number of rows returned.
    #[serde(default)]
    pub row_count: usize,
    /// Rendered result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// Format of `formatted` ("table", "json", "csv").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_type: Option<String>,
    /// excellent / good / fair / poor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_rating: Option<String>,
    /// Follow-up hints.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ExecutionRecord {
    /// Creates a failed execution record.
    #[must_use]
    pub fn failed(sql: impl Into<String>, error: impl Into<String>, execution_time_ms: f64) -> Self {
        Self {
            sql: sql.into(),
            success: false,
            error: Some(error.into()),
            execution_time_ms,
            ..Default::default()
        }
    }
}

/// One entry of the run's error history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Component that failed, e.g. `schema_agent` or `supervisor`.
    pub source: String,
    /// Stage the run was in.
    pub stage: PipelineStage,
    /// Error kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// When the error was recorded.
    pub at: Timestamp,
}

impl ErrorRecord {
    /// Creates an error record stamped now.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        stage: PipelineStage,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            stage,
            kind: kind.into(),
            message: message.into(),
            at: crate::utils::now_utc(),
        }
    }

    /// Renders as `source@stage: message`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}@{}: {}", self.source, self.stage, self.message)
    }
}

/// A chart produced from a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartArtifact {
    /// bar / line / pie / scatter.
    pub chart_type: String,
    /// Chart title.
    pub title: String,
    /// Column used for the x axis or labels.
    pub x_field: String,
    /// Columns plotted as series.
    pub y_fields: Vec<String>,
    /// ECharts-compatible option object.
    pub spec: serde_json::Value,
}
