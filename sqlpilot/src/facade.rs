//! The public "ask a question, get an answer" entry point.

use crate::agents::{
    ChartAgent, KeywordQueryAnalyzer, QueryAnalyzer, QueryExecutor, SampleRetrievalAgent,
    SampleRetriever, SchemaAgent, SchemaRetriever, SqlExecutorAgent, SqlGeneratorAgent,
    SqlValidatorAgent,
};
use crate::config::PipelineConfig;
use crate::core::PipelineOutcome;
use crate::errors::{ConfigError, SqlPilotError};
use crate::events::{EventSink, NoOpEventSink};
use crate::llm::ModelClient;
use crate::state::UserContext;
use crate::supervisor::{Agents, Supervisor};
use crate::validation::SqlValidator;
use std::fmt;
use std::sync::Arc;

/// Answers natural-language questions against a database.
///
/// Build one at startup with [`SqlPilot::builder`] and share it; runs are
/// independent and may proceed concurrently.
#[derive(Debug)]
pub struct SqlPilot {
    supervisor: Supervisor,
}

impl SqlPilot {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> SqlPilotBuilder {
        SqlPilotBuilder::new()
    }

    /// Wraps an already assembled supervisor.
    #[must_use]
    pub fn from_supervisor(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }

    /// Answers `query` using the database behind `connection_id`.
    ///
    /// Never fails: pipeline errors come back as an outcome with
    /// `success == false` and `final_stage == "error"`.
    pub async fn run_query(&self, query: &str, connection_id: i64) -> PipelineOutcome {
        self.run_query_with(query, &UserContext::new(connection_id)).await
    }

    /// Like [`run_query`](Self::run_query) with a full caller context.
    pub async fn run_query_with(&self, query: &str, ctx: &UserContext) -> PipelineOutcome {
        self.supervisor.run(query, ctx).await.outcome()
    }

    /// The supervisor behind this facade.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

/// Assembles the standard agents from collaborators.
pub struct SqlPilotBuilder {
    config: PipelineConfig,
    schema_retriever: Option<Arc<dyn SchemaRetriever>>,
    analyzer: Arc<dyn QueryAnalyzer>,
    model: Option<Arc<dyn ModelClient>>,
    executor: Option<Arc<dyn QueryExecutor>>,
    samples: Option<Arc<dyn SampleRetriever>>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for SqlPilotBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlPilotBuilder")
            .field("config", &self.config)
            .field("schema_retriever", &self.schema_retriever.is_some())
            .field("model", &self.model.is_some())
            .field("executor", &self.executor.is_some())
            .field("samples", &self.samples.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SqlPilotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlPilotBuilder {
    /// Creates a builder with the default config and keyword analysis.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            schema_retriever: None,
            analyzer: Arc::new(KeywordQueryAnalyzer::new()),
            model: None,
            executor: None,
            samples: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the pipeline config.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the schema source.
    #[must_use]
    pub fn schema_retriever(mut self, retriever: Arc<dyn SchemaRetriever>) -> Self {
        self.schema_retriever = Some(retriever);
        self
    }

    /// Replaces the keyword analyzer.
    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Sets the model used for SQL generation.
    #[must_use]
    pub fn model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the database executor.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the sample source used by the optional sample hop.
    #[must_use]
    pub fn sample_retriever(mut self, samples: Arc<dyn SampleRetriever>) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validates the config and wires the agents.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a required collaborator
    /// (schema retriever, model, executor) is missing.
    pub fn build(self) -> Result<SqlPilot, SqlPilotError> {
        self.config.validate()?;
        let missing =
            |what: &str| SqlPilotError::Config(ConfigError::Invalid(format!("{what} is required")));
        let retriever = self.schema_retriever.ok_or_else(|| missing("schema retriever"))?;
        let model = self.model.ok_or_else(|| missing("model client"))?;
        let executor = self.executor.ok_or_else(|| missing("query executor"))?;

        let validator = SqlValidator::new()
            .with_row_limit(self.config.default_row_limit)
            .with_limit_fix(self.config.auto_fix_limit);

        let mut agents = Agents::new(
            Arc::new(SchemaAgent::new(retriever, self.analyzer)),
            Arc::new(SqlGeneratorAgent::new(model)),
            Arc::new(SqlValidatorAgent::new(validator)),
            Arc::new(
                SqlExecutorAgent::new(executor)
                    .with_query_timeout(self.config.query_timeout())
                    .with_format(self.config.result_format, self.config.preview_rows),
            ),
        );
        if let Some(samples) = self.samples {
            agents = agents.with_sample(Arc::new(SampleRetrievalAgent::new(samples)));
        }
        if self.config.chart_enabled {
            agents = agents.with_chart(Arc::new(ChartAgent::new()));
        }

        tracing::debug!(
            max_retries = self.config.max_retries,
            max_iterations = self.config.max_iterations,
            sample_hop = agents.sample.is_some() && self.config.sample_retrieval_enabled,
            chart_hop = agents.chart.is_some(),
            "Built sqlpilot"
        );

        Ok(SqlPilot {
            supervisor: Supervisor::new(agents, self.config).with_event_sink(self.events),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::QueryResult;
    use crate::testing::{
        assert_outcome_failed, assert_outcome_succeeded, school_catalog, StaticQueryExecutor,
        StubModelClient, SCHOOL_CONNECTION,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_build_requires_collaborators() {
        let err = SqlPilot::builder().build().unwrap_err();
        assert!(err.to_string().contains("schema retriever is required"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = SqlPilot::builder()
            .config(PipelineConfig::default().with_max_iterations(0))
            .schema_retriever(Arc::new(school_catalog()))
            .model(Arc::new(StubModelClient::new()))
            .executor(Arc::new(StaticQueryExecutor::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlPilotError::Config(_)));
    }

    #[tokio::test]
    async fn test_run_query_answers_question() {
        let sql = "SELECT COUNT(*) AS teachers FROM teachers LIMIT 100";
        let pilot = SqlPilot::builder()
            .schema_retriever(Arc::new(school_catalog()))
            .model(Arc::new(StubModelClient::new().then_complete(format!("```sql\n{sql}\n```"))))
            .executor(Arc::new(StaticQueryExecutor::new().with_result(
                sql,
                QueryResult::rows(vec!["teachers".to_string()], vec![vec![json!(4)]]),
            )))
            .build()
            .unwrap();

        let outcome = pilot.run_query("how many teachers", SCHOOL_CONNECTION).await;
        assert_outcome_succeeded(&outcome);
        let answer = outcome.result.unwrap();
        assert_eq!(answer.sql, sql);
        assert_eq!(answer.rows, vec![vec![json!(4)]]);
        assert!(answer.formatted.unwrap().contains("teachers"));
    }

    #[tokio::test]
    async fn test_grouped_counts_without_chart_intent_have_no_chart() {
        let sql = "SELECT t.name, COUNT(s.id) AS students FROM teachers t \
                   LEFT JOIN students s ON s.teacher_id = t.id GROUP BY t.name LIMIT 100";
        let rows = QueryResult::rows(
            vec!["name".to_string(), "students".to_string()],
            vec![
                vec![json!("Li Wei"), json!(12)],
                vec![json!("Wang Fang"), json!(9)],
                vec![json!("Zhao Min"), json!(11)],
            ],
        );
        let pilot = SqlPilot::builder()
            .schema_retriever(Arc::new(school_catalog()))
            .model(Arc::new(StubModelClient::new().then_complete(format!("```sql\n{sql}\n```"))))
            .executor(Arc::new(StaticQueryExecutor::new().with_result(sql, rows)))
            .build()
            .unwrap();

        let outcome = pilot
            .run_query("how many teachers and how many students per teacher", SCHOOL_CONNECTION)
            .await;
        assert_outcome_succeeded(&outcome);
        assert_eq!(outcome.final_stage, "completed");
        assert!(outcome.chart().is_none());
        assert_eq!(outcome.result.unwrap().row_count, 3);
    }

    #[tokio::test]
    async fn test_run_query_unknown_connection_fails_cleanly() {
        let pilot = SqlPilot::builder()
            .config(PipelineConfig::default().with_max_retries(2))
            .schema_retriever(Arc::new(school_catalog()))
            .model(Arc::new(StubModelClient::new()))
            .executor(Arc::new(StaticQueryExecutor::new()))
            .build()
            .unwrap();

        let outcome = pilot.run_query("how many teachers", 99).await;
        assert_outcome_failed(&outcome);
        assert!(outcome.error.unwrap().contains("unknown connection 99"));
        assert_eq!(outcome.diagnostics.unwrap().retry_count, 2);
    }
}
