//! Best-effort textual repairs.

use super::findings::Finding;
use crate::state::{ValidationKind, ValidationRecord};
use serde::{Deserialize, Serialize};

/// Result of one auto-fix pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    /// SQL before the pass.
    pub original_sql: String,
    /// SQL after the pass; equal to `original_sql` when nothing applied.
    pub fixed_sql: String,
    /// Repairs performed, in order.
    pub fixes_applied: Vec<String>,
}

impl FixOutcome {
    /// Returns true if the pass changed the SQL.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.fixed_sql != self.original_sql
    }

    /// Converts the outcome into a `fix` record judging the original SQL.
    #[must_use]
    pub fn to_record(&self) -> ValidationRecord {
        let mut record = ValidationRecord::new(ValidationKind::Fix, self.original_sql.clone());
        record.fixed_sql = Some(self.fixed_sql.clone());
        record.fixes_applied = self.fixes_applied.clone();
        record
    }
}

/// Applies repairs for the fixable findings in `findings`.
///
/// Unfixable findings are ignored. Each repair re-checks the current text,
/// so repeated findings do not stack. The result is not guaranteed to be
/// valid and must be re-validated.
#[must_use]
pub fn fix_sql(sql: &str, findings: &[Finding], row_limit: u32) -> FixOutcome {
    let mut fixed = sql.to_string();
    let mut fixes_applied = Vec::new();

    for finding in findings {
        match finding {
            Finding::UnbalancedParentheses { .. } => {
                let open = fixed.matches('(').count();
                let close = fixed.matches(')').count();
                if open > close {
                    fixed.push_str(&")".repeat(open - close));
                    fixes_applied.push("Added missing closing parenthesis".to_string());
                } else if close > open {
                    fixed = format!("{}{fixed}", "(".repeat(close - open));
                    fixes_applied.push("Added missing opening parenthesis".to_string());
                }
            }
            Finding::MissingSelect => {
                if !fixed.trim().to_uppercase().starts_with("SELECT") {
                    fixed = format!("SELECT * FROM ({}) AS subquery", trim_terminator(&fixed));
                    fixes_applied.push("Wrapped statement in SELECT".to_string());
                }
            }
            Finding::MissingLimit => {
                if !fixed.to_uppercase().contains("LIMIT") {
                    fixed = format!("{} LIMIT {row_limit}", trim_terminator(&fixed));
                    fixes_applied.push(format!("Added LIMIT {row_limit}"));
                }
            }
            _ => {}
        }
    }

    FixOutcome {
        original_sql: sql.to_string(),
        fixed_sql: fixed,
        fixes_applied,
    }
}

fn trim_terminator(sql: &str) -> &str {
    sql.trim_end().trim_end_matches(';').trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_appends_limit() {
        let outcome = fix_sql("SELECT id FROM users;", &[Finding::MissingLimit], 100);
        assert_eq!(outcome.fixed_sql, "SELECT id FROM users LIMIT 100");
        assert_eq!(outcome.fixes_applied, vec!["Added LIMIT 100"]);
        assert!(outcome.changed());
    }

    #[test]
    fn test_balances_parentheses_both_ways() {
        let open = fix_sql(
            "SELECT COUNT((id FROM t",
            &[Finding::UnbalancedParentheses { open: 2, close: 0 }],
            100,
        );
        assert_eq!(open.fixed_sql, "SELECT COUNT((id FROM t))");

        let close = fix_sql(
            "id) FROM t",
            &[Finding::UnbalancedParentheses { open: 0, close: 1 }],
            100,
        );
        assert_eq!(close.fixed_sql, "(id) FROM t");
    }

    #[test]
    fn test_wraps_missing_select() {
        let outcome = fix_sql("VALUES (1)", &[Finding::MissingSelect], 100);
        assert_eq!(outcome.fixed_sql, "SELECT * FROM (VALUES (1)) AS subquery");
    }

    #[test]
    fn test_ignores_unfixable_findings() {
        let findings = [
            Finding::DangerousKeyword { keyword: "DROP".into() },
            Finding::InjectionPattern { signature: "tautology_or".into() },
        ];
        let outcome = fix_sql("DROP TABLE x", &findings, 100);
        assert!(!outcome.changed());
        assert!(outcome.fixes_applied.is_empty());
    }

    #[test]
    fn test_repeated_finding_does_not_stack() {
        let outcome = fix_sql(
            "SELECT 1",
            &[Finding::MissingLimit, Finding::MissingLimit],
            50,
        );
        assert_eq!(outcome.fixed_sql, "SELECT 1 LIMIT 50");
    }

    #[test]
    fn test_fix_record_carries_patch() {
        let record = fix_sql("SELECT 1", &[Finding::MissingLimit], 100).to_record();
        assert_eq!(record.kind, ValidationKind::Fix);
        assert_eq!(record.fixed_sql.as_deref(), Some("SELECT 1 LIMIT 100"));
        assert!(record.judges("SELECT 1"));
    }
}
