//! Schema analysis agent.

use super::ports::{QueryAnalyzer, SchemaRetriever};
use super::{AgentKind, WorkerAgent};
use crate::errors::AgentError;
use crate::state::{Message, PipelineState, QueryAnalysis, SchemaInfo, StateDelta, UserContext};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Analyses the question and retrieves the relevant schema.
pub struct SchemaAgent {
    retriever: Arc<dyn SchemaRetriever>,
    analyzer: Arc<dyn QueryAnalyzer>,
}

impl fmt::Debug for SchemaAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaAgent").finish_non_exhaustive()
    }
}

impl SchemaAgent {
    /// Creates the agent.
    #[must_use]
    pub fn new(retriever: Arc<dyn SchemaRetriever>, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        Self { retriever, analyzer }
    }
}

/// Entities that match no retrieved table or column name.
#[must_use]
pub fn missing_entities(schema: &SchemaInfo, analysis: &QueryAnalysis) -> Vec<String> {
    let names: Vec<String> = schema
        .tables
        .values()
        .flat_map(|t| std::iter::once(t.name.to_lowercase()).chain(t.columns.iter().map(|c| c.name.to_lowercase())))
        .collect();

    analysis
        .entities
        .iter()
        .filter(|entity| {
            let entity = entity.to_lowercase();
            !names
                .iter()
                .any(|name| name.contains(&entity) || entity.contains(name.as_str()))
        })
        .cloned()
        .collect()
}

#[async_trait]
impl WorkerAgent for SchemaAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Schema
    }

    async fn invoke(
        &self,
        _request: &str,
        state: &PipelineState,
        ctx: &UserContext,
    ) -> Result<StateDelta, AgentError> {
        let name = self.kind().name();
        let analysis = self.analyzer.analyze(state.query());

        let mut schema = self
            .retriever
            .retrieve_schema(ctx.connection_id, state.query())
            .await
            .map_err(|e| AgentError::tool(name, "retrieve_database_schema", format!("{e:#}")))?;
        if schema.is_empty() {
            return Err(AgentError::EmptySchema {
                connection_id: ctx.connection_id,
            });
        }

        let tables: Vec<String> = schema.tables.keys().cloned().collect();
        match self.retriever.get_value_mappings(ctx.connection_id, &tables).await {
            Ok(mappings) => schema.value_mappings.extend(mappings),
            Err(e) => tracing::warn!(agent = name, error = %e, "Value mapping lookup failed"),
        }

        let missing = missing_entities(&schema, &analysis);
        let mut summary = format!(
            "Found {} table(s): {}",
            tables.len(),
            tables.join(", ")
        );
        if !missing.is_empty() {
            summary.push_str(&format!(
                ". Schema may be missing tables for: {}",
                missing.join(", ")
            ));
        }

        tracing::debug!(
            agent = name,
            tables = tables.len(),
            missing = missing.len(),
            "Schema retrieved"
        );

        Ok(StateDelta::new()
            .analysis(analysis)
            .schema(schema)
            .message(Message::assistant(summary).with_name(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::analysis::KeywordQueryAnalyzer;
    use crate::agents::ports::MockSchemaRetriever;
    use crate::state::{ColumnInfo, TableInfo};
    use std::collections::BTreeMap;

    fn school_schema() -> SchemaInfo {
        let mut schema = SchemaInfo::default();
        schema.tables.insert(
            "teachers".to_string(),
            TableInfo::new("teachers")
                .with_column(ColumnInfo::new("id", "INTEGER").primary_key())
                .with_column(ColumnInfo::new("name", "TEXT")),
        );
        schema
    }

    fn agent(retriever: MockSchemaRetriever) -> SchemaAgent {
        SchemaAgent::new(Arc::new(retriever), Arc::new(KeywordQueryAnalyzer::new()))
    }

    #[tokio::test]
    async fn test_schema_agent_appends_analysis_and_schema() {
        let mut retriever = MockSchemaRetriever::new();
        retriever
            .expect_retrieve_schema()
            .returning(|_, _| Ok(school_schema()));
        retriever.expect_get_value_mappings().returning(|_, _| {
            let mut terms = BTreeMap::new();
            terms.insert("math".to_string(), "MATH".to_string());
            let mut mappings = BTreeMap::new();
            mappings.insert("teachers.subject".to_string(), terms);
            Ok(mappings)
        });

        let state = PipelineState::new("how many teachers and how many students per teacher", 3);
        let delta = agent(retriever)
            .invoke("analyze", &state, &UserContext::new(1))
            .await
            .unwrap();

        assert_eq!(delta.query_analysis.len(), 1);
        assert_eq!(delta.schema_info.len(), 1);
        assert!(delta.schema_info[0].value_mappings.contains_key("teachers.subject"));
        assert!(delta.conversation[0].content.contains("students"));
        assert!(delta.current_stage.is_none());
    }

    #[tokio::test]
    async fn test_empty_schema_is_error() {
        let mut retriever = MockSchemaRetriever::new();
        retriever
            .expect_retrieve_schema()
            .returning(|_, _| Ok(SchemaInfo::default()));

        let state = PipelineState::new("q", 3);
        let err = agent(retriever)
            .invoke("analyze", &state, &UserContext::new(7))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptySchema { connection_id: 7 }));
    }

    #[tokio::test]
    async fn test_retriever_failure_is_tool_error() {
        let mut retriever = MockSchemaRetriever::new();
        retriever
            .expect_retrieve_schema()
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));

        let state = PipelineState::new("q", 3);
        let err = agent(retriever)
            .invoke("analyze", &state, &UserContext::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_missing_entities_matches_plurals() {
        let analysis = QueryAnalysis {
            entities: vec!["teacher".into(), "students".into()],
            ..Default::default()
        };
        assert_eq!(missing_entities(&school_schema(), &analysis), vec!["students"]);
    }
}
