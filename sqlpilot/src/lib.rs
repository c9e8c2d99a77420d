//! # Sqlpilot
//!
//! Answers natural-language questions with SQL, using a small team of
//! worker agents coordinated by a supervisor.
//!
//! A run moves through a fixed set of stages:
//!
//! - **Schema analysis**: find the tables the question needs
//! - **Sample retrieval** (optional): find similar reference queries
//! - **SQL generation**: ask the model for one read-only query
//! - **SQL validation**: syntax, security and performance checks, with
//!   auto-fix for simple defects
//! - **SQL execution**: run the query, format the rows and optionally chart
//!   them
//!
//! Agents never write the shared state directly. They return a
//! [`StateDelta`](state::StateDelta) that the supervisor merges, and no SQL
//! reaches the database unless validation cleared that exact text.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlpilot::prelude::*;
//!
//! let pilot = SqlPilot::builder()
//!     .config(PipelineConfig::from_json_file("sqlpilot.json")?)
//!     .schema_retriever(catalog)
//!     .model(model)
//!     .executor(database)
//!     .build()?;
//!
//! let outcome = pilot.run_query("各班级平均成绩", 1).await;
//! if outcome.success {
//!     println!("{}", outcome.result.unwrap().formatted.unwrap_or_default());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod catalog;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod facade;
pub mod llm;
pub mod observability;
pub mod state;
pub mod supervisor;
pub mod testing;
pub mod utils;
pub mod validation;

pub use facade::{SqlPilot, SqlPilotBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::{
        AgentKind, QueryExecutor, QueryResult, SampleRetriever, SchemaRetriever, WorkerAgent,
    };
    pub use crate::catalog::InMemorySchemaCatalog;
    pub use crate::config::{ModelConfig, PipelineConfig};
    pub use crate::core::{PipelineOutcome, PipelineStage, QueryAnswer};
    pub use crate::errors::{AgentError, ConfigError, ModelError, SqlPilotError, StateMergeError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::facade::{SqlPilot, SqlPilotBuilder};
    pub use crate::llm::{CompletionRequest, CompletionResponse, ModelClient};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::state::{PipelineState, StateDelta, UserContext};
    pub use crate::supervisor::{Agents, Supervisor};
    pub use crate::validation::{SqlValidator, ValidationReport};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
