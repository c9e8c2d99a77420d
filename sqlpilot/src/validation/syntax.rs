//! Parser-backed syntax check.

use super::findings::Finding;
use super::report::CheckReport;
use crate::state::ValidationKind;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Keywords that write to or restructure the database.
pub const DANGEROUS_KEYWORDS: [&str; 7] =
    ["DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE"];

/// Parses `sql` and scans it for read-only-query defects.
///
/// The text scans run regardless of whether the parse succeeded. Keyword
/// matches are plain substring matches on the uppercased text.
#[must_use]
pub fn check_syntax(sql: &str) -> CheckReport {
    let mut report = CheckReport::new(ValidationKind::Syntax, sql);

    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) if statements.is_empty() => report.push(Finding::EmptyStatement),
        Ok(_) => {}
        Err(e) => report.push(Finding::ParseError {
            message: e.to_string(),
        }),
    }

    let upper = sql.to_uppercase();
    for keyword in DANGEROUS_KEYWORDS {
        if upper.contains(keyword) {
            report.push(Finding::DangerousKeyword {
                keyword: keyword.to_string(),
            });
        }
    }

    if !upper.contains("SELECT") {
        report.push(Finding::MissingSelect);
    }

    let open = sql.matches('(').count();
    let close = sql.matches(')').count();
    if open != close {
        report.push(Finding::UnbalancedParentheses { open, close });
    }

    if sql.matches('\'').count() % 2 != 0 {
        report.push(Finding::UnbalancedSingleQuotes);
    }
    if sql.matches('"').count() % 2 != 0 {
        report.push(Finding::UnbalancedDoubleQuotes);
    }

    if !has_row_limit(&upper) {
        report.push(Finding::MissingLimit);
    }

    report
}

pub(crate) fn has_row_limit(upper: &str) -> bool {
    upper.contains("LIMIT") || upper.contains("TOP")
}
