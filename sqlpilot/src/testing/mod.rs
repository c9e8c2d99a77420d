//! Testing utilities for sqlpilot.
//!
//! This module provides:
//! - Scripted agents, a stub model client and a static query executor
//! - A school database fixture
//! - Assertions over outcomes and states

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_error_sources, assert_only_cleared_sql_executed, assert_outcome_failed,
    assert_outcome_succeeded, assert_stage,
};
pub use fixtures::{school_catalog, school_schema, school_value_mappings, SCHOOL_CONNECTION};
pub use mocks::{RecordedCall, ScriptedAgent, StaticQueryExecutor, Step, StubModelClient};
