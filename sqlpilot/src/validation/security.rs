//! Injection heuristics.

use super::findings::Finding;
use super::report::CheckReport;
use crate::state::ValidationKind;
use regex::Regex;
use std::sync::LazyLock;

/// Injection signatures, matched against the lowercased SQL.
#[allow(clippy::expect_used)]
static INJECTION_SIGNATURES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("comment_injection", r"';.*--"),
        ("union_select", r"\bunion\b.*\bselect\b"),
        ("tautology_or", r"\bor\b.*1\s*=\s*1"),
        ("tautology_and", r"\band\b.*1\s*=\s*1"),
        ("exec_call", r"\bexec\s*\("),
        ("stored_procedure", r"\bsp_"),
        ("extended_procedure", r"\bxp_"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("static injection pattern")))
    .collect()
});

#[allow(clippy::expect_used)]
static QUOTED_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'[^']*'").expect("static literal pattern"));

/// Scans `sql` for injection signatures.
///
/// Each matching signature is one security issue. Concatenation and stray
/// quotes are warnings only.
#[must_use]
pub fn check_security(sql: &str) -> CheckReport {
    let mut report = CheckReport::new(ValidationKind::Security, sql);
    let lower = sql.to_lowercase();

    for (signature, pattern) in INJECTION_SIGNATURES.iter() {
        if pattern.is_match(&lower) {
            report.push(Finding::InjectionPattern {
                signature: (*signature).to_string(),
            });
        }
    }

    if lower.contains("concat") || sql.contains("||") {
        report.push(Finding::StringConcatenation);
    }
    if sql.contains('\'') && !QUOTED_LITERAL.is_match(sql) {
        report.push(Finding::UnquotedInput);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn signatures(sql: &str) -> Vec<String> {
        check_security(sql)
            .findings
            .into_iter()
            .filter_map(|f| match f {
                Finding::InjectionPattern { signature } => Some(signature),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tautology_is_insecure() {
        let record = check_security("SELECT id FROM t WHERE x=1 OR 1=1").to_record();
        assert!(!record.is_secure);
        assert!(!record.security_issues.is_empty());
    }

    #[test]
    fn test_plain_select_is_secure() {
        let report = check_security("SELECT * FROM users");
        assert!(report.passed());
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_each_signature_is_a_distinct_issue() {
        assert_eq!(
            signatures("SELECT a FROM t UNION SELECT pwd FROM users"),
            vec!["union_select"]
        );
        assert_eq!(signatures("x'; DROP TABLE t --"), vec!["comment_injection"]);
        assert_eq!(signatures("EXEC (cmd)"), vec!["exec_call"]);
        assert_eq!(signatures("SELECT sp_who, xp_cmdshell"), vec!["stored_procedure", "extended_procedure"]);
    }

    #[test]
    fn test_order_by_is_not_a_tautology() {
        assert!(signatures("SELECT id FROM t ORDER BY id LIMIT 10").is_empty());
    }

    #[test]
    fn test_concatenation_is_warning() {
        let report = check_security("SELECT first || ' ' || last FROM people LIMIT 5");
        assert!(report.passed());
        assert_eq!(report.findings, vec![Finding::StringConcatenation]);
    }

    #[test]
    fn test_stray_quote_is_warning() {
        let report = check_security("SELECT name FROM t WHERE o'brien");
        assert!(report.findings.contains(&Finding::UnquotedInput));
        assert!(report.passed());
    }
}
