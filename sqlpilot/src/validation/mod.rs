//! Static SQL validation: syntax, security, performance and auto-fix.
//!
//! Every check is a pure function of the SQL text. [`SqlValidator`] bundles
//! them with the row limit used by the fixer.

mod findings;
mod fixer;
mod performance;
mod report;
mod security;
mod syntax;


pub use findings::{Finding, Severity};
pub use fixer::{fix_sql, FixOutcome};
pub use performance::check_performance;
pub use report::{CheckReport, PERFORMANCE_PENALTY};
pub use security::check_security;
pub use syntax::{check_syntax, DANGEROUS_KEYWORDS};

use crate::state::ValidationRecord;
use serde::{Deserialize, Serialize};

/// Combined verdict of the three checks on one SQL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// The SQL that was checked.
    pub sql: String,
    /// Syntax check.
    pub syntax: CheckReport,
    /// Security check.
    pub security: CheckReport,
    /// Performance check.
    pub performance: CheckReport,
}

impl ValidationReport {
    /// No syntax errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.syntax.passed()
    }

    /// No security issues.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.security.passed()
    }

    /// Valid and secure; the SQL may be executed.
    #[must_use]
    pub fn cleared(&self) -> bool {
        self.is_valid() && self.is_secure()
    }

    /// Performance score of the SQL.
    #[must_use]
    pub fn performance_score(&self) -> u8 {
        self.performance.score()
    }

    /// All findings, syntax first.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.syntax
            .findings
            .iter()
            .chain(&self.security.findings)
            .chain(&self.performance.findings)
    }

    /// Findings that block execution.
    pub fn blocking(&self) -> impl Iterator<Item = &Finding> {
        self.findings().filter(|f| f.blocks_execution())
    }

    /// Returns true if patching is worth a try.
    ///
    /// At least one blocking finding must have a known repair, and none may
    /// be of a kind that always requires regeneration. A parse error alone
    /// does not rule a patch out, since unbalanced parentheses also break
    /// the parse.
    #[must_use]
    pub fn is_fixable(&self) -> bool {
        self.blocking().any(Finding::is_fixable) && !self.findings().any(Finding::forbids_fix)
    }

    /// Records for the state, in check order.
    #[must_use]
    pub fn records(&self) -> Vec<ValidationRecord> {
        vec![
            self.syntax.to_record(),
            self.security.to_record(),
            self.performance.to_record(),
        ]
    }

    /// Human-readable problems for regeneration prompts.
    #[must_use]
    pub fn feedback(&self) -> Vec<String> {
        self.blocking().map(ToString::to_string).collect()
    }
}

/// Runs the checks and the fixer with a fixed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlValidator {
    row_limit: u32,
    fix_missing_limit: bool,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self {
            row_limit: 100,
            fix_missing_limit: true,
        }
    }
}

impl SqlValidator {
    /// Creates a validator with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the LIMIT appended by the fixer.
    #[must_use]
    pub fn with_row_limit(mut self, row_limit: u32) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Enables or disables appending a LIMIT to unbounded queries.
    #[must_use]
    pub fn with_limit_fix(mut self, enabled: bool) -> Self {
        self.fix_missing_limit = enabled;
        self
    }

    /// Runs all three checks.
    #[must_use]
    pub fn validate(&self, sql: &str) -> ValidationReport {
        ValidationReport {
            sql: sql.to_string(),
            syntax: check_syntax(sql),
            security: check_security(sql),
            performance: check_performance(sql),
        }
    }

    /// Findings in `report` this validator would repair.
    ///
    /// Blocking fixable findings always qualify; a missing LIMIT qualifies
    /// when the limit fix is enabled.
    #[must_use]
    pub fn repairs_for(&self, report: &ValidationReport) -> Vec<Finding> {
        report
            .findings()
            .filter(|f| f.is_fixable())
            .filter(|f| **f != Finding::MissingLimit || self.fix_missing_limit)
            .cloned()
            .collect()
    }

    /// Applies the repairs for `report`.
    #[must_use]
    pub fn fix(&self, report: &ValidationReport) -> FixOutcome {
        fix_sql(&report.sql, &self.repairs_for(report), self.row_limit)
    }
}
