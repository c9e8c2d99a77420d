//! Per-check reports and their conversion into state records.

use super::findings::{Finding, Severity};
use crate::state::{ValidationKind, ValidationRecord};
use serde::{Deserialize, Serialize};

/// Points deducted from the performance score per scored issue.
pub const PERFORMANCE_PENALTY: u8 = 20;

/// Findings produced by one check on one SQL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// The check that ran.
    pub kind: ValidationKind,
    /// The SQL that was checked.
    pub sql: String,
    /// Findings in detection order.
    pub findings: Vec<Finding>,
}

impl CheckReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(kind: ValidationKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            findings: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    /// Findings of the given severity.
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity() == severity)
    }

    /// Returns true if no error-level finding was reported.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.with_severity(Severity::Error).next().is_none()
    }

    /// 100 minus the penalty per error-level finding, floored at 0.
    #[must_use]
    pub fn score(&self) -> u8 {
        let issues = self.with_severity(Severity::Error).count();
        let penalty = issues.saturating_mul(usize::from(PERFORMANCE_PENALTY));
        u8::try_from(100usize.saturating_sub(penalty)).unwrap_or(0)
    }

    /// Converts the report into a record for the state.
    #[must_use]
    pub fn to_record(&self) -> ValidationRecord {
        let mut record = ValidationRecord::new(self.kind, self.sql.clone());
        let render = |severity| {
            self.with_severity(severity)
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        };
        let errors = render(Severity::Error);
        record.warnings = render(Severity::Warning);
        record.suggestions = render(Severity::Suggestion);

        match self.kind {
            ValidationKind::Syntax => {
                record.is_valid = errors.is_empty();
                record.errors = errors;
            }
            ValidationKind::Security => {
                record.is_secure = errors.is_empty();
                record.security_issues = errors;
            }
            ValidationKind::Performance => {
                record.performance_score = Some(self.score());
                record.performance_issues = errors;
            }
            ValidationKind::Fix => record.errors = errors,
        }
        record
    }
}
