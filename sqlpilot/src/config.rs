//! Pipeline and model configuration.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take the defaults below.

use crate::agents::ResultFormat;
use crate::errors::ConfigError;
use crate::llm::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for one supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Recoverable failures allowed per run.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Hard ceiling on supervisor loop iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Time budget for one agent invocation.
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,
    /// Time budget for one database query.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Route through the sample retrieval hop.
    #[serde(default)]
    pub sample_retrieval_enabled: bool,
    /// Let the fixer append a LIMIT to unbounded queries.
    #[serde(default = "default_true")]
    pub auto_fix_limit: bool,
    /// LIMIT appended by the fixer.
    #[serde(default = "default_row_limit")]
    pub default_row_limit: u32,
    /// Run the charting hop at all.
    #[serde(default = "default_true")]
    pub chart_enabled: bool,
    /// Chart numeric results even without a visualization keyword.
    #[serde(default)]
    pub auto_chart: bool,
    /// Smallest result that is charted.
    #[serde(default = "default_chart_min_rows")]
    pub chart_min_rows: usize,
    /// Largest result that is charted.
    #[serde(default = "default_chart_max_rows")]
    pub chart_max_rows: usize,
    /// Rows shown in the table rendering.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    /// Rendering of query results.
    #[serde(default)]
    pub result_format: ResultFormat,
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_iterations() -> u32 {
    16
}

fn default_agent_timeout_ms() -> u64 {
    60_000
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_row_limit() -> u32 {
    100
}

fn default_chart_min_rows() -> usize {
    2
}

fn default_chart_max_rows() -> usize {
    1000
}

fn default_preview_rows() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_iterations: default_max_iterations(),
            agent_timeout_ms: default_agent_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            sample_retrieval_enabled: false,
            auto_fix_limit: true,
            default_row_limit: default_row_limit(),
            chart_enabled: true,
            auto_chart: false,
            chart_min_rows: default_chart_min_rows(),
            chart_max_rows: default_chart_max_rows(),
            preview_rows: default_preview_rows(),
            result_format: ResultFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be at least 1".to_string()));
        }
        if self.chart_min_rows > self.chart_max_rows {
            return Err(ConfigError::Invalid(format!(
                "chart_min_rows ({}) exceeds chart_max_rows ({})",
                self.chart_min_rows, self.chart_max_rows
            )));
        }
        Ok(())
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the iteration ceiling.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the agent timeout.
    #[must_use]
    pub fn with_agent_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.agent_timeout_ms = timeout_ms;
        self
    }

    /// Sets the query timeout.
    #[must_use]
    pub fn with_query_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.query_timeout_ms = timeout_ms;
        self
    }

    /// Enables the sample retrieval hop.
    #[must_use]
    pub fn with_sample_retrieval(mut self, enabled: bool) -> Self {
        self.sample_retrieval_enabled = enabled;
        self
    }

    /// Enables or disables charting.
    #[must_use]
    pub fn with_charts(mut self, enabled: bool) -> Self {
        self.chart_enabled = enabled;
        self
    }

    /// Enables or disables keyword-free charting of numeric results.
    #[must_use]
    pub fn with_auto_chart(mut self, enabled: bool) -> Self {
        self.auto_chart = enabled;
        self
    }

    /// Sets the result rendering.
    #[must_use]
    pub fn with_result_format(mut self, format: ResultFormat) -> Self {
        self.result_format = format;
        self
    }

    /// Agent timeout as a Duration.
    #[must_use]
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Query timeout as a Duration.
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Settings for the model client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Completion token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retry policy for 429 and 5xx answers.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ModelConfig {
    /// Defaults overridden by `SQLPILOT_MODEL`, `SQLPILOT_MODEL_BASE_URL`,
    /// `SQLPILOT_MODEL_API_KEY` and `SQLPILOT_MODEL_TEMPERATURE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(model) = lookup("SQLPILOT_MODEL") {
            config.model = model;
        }
        if let Some(base_url) = lookup("SQLPILOT_MODEL_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(api_key) = lookup("SQLPILOT_MODEL_API_KEY") {
            config.api_key = Some(api_key);
        }
        if let Some(raw) = lookup("SQLPILOT_MODEL_TEMPERATURE") {
            config.temperature = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("SQLPILOT_MODEL_TEMPERATURE is not a number: {raw}"))
            })?;
        }
        Ok(config)
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}
