//! Query-shape heuristics and the performance score.

use super::findings::Finding;
use super::report::CheckReport;
use super::syntax::has_row_limit;
use crate::state::ValidationKind;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static SELECT_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SELECT\s+\*").expect("static select pattern"));
#[allow(clippy::expect_used)]
static SUBQUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*SELECT\b").expect("static subquery pattern"));
#[allow(clippy::expect_used)]
static LIKE_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"LIKE\s+'([^']*)'").expect("static like pattern"));

/// More nested selects than this triggers a JOIN suggestion.
const SUBQUERY_THRESHOLD: usize = 2;

/// Scores `sql` on a 0-100 scale.
///
/// Full scans, cross joins and leading-wildcard `LIKE` each cost 20 points.
/// `SELECT *` is a warning and costs nothing.
#[must_use]
pub fn check_performance(sql: &str) -> CheckReport {
    let mut report = CheckReport::new(ValidationKind::Performance, sql);
    let upper = sql.to_uppercase();

    if SELECT_STAR.is_match(&upper) {
        report.push(Finding::SelectStar);
    }
    if !upper.contains("WHERE") && !upper.contains("LIMIT") {
        report.push(Finding::FullTableScan);
    }
    if upper.contains("CROSS JOIN") {
        report.push(Finding::CrossJoin);
    }

    let subqueries = SUBQUERY.find_iter(&upper).count();
    if subqueries > SUBQUERY_THRESHOLD {
        report.push(Finding::ManySubqueries { count: subqueries });
    }

    if upper.contains("ORDER BY") && !has_row_limit(&upper) {
        report.push(Finding::OrderByWithoutLimit);
    }

    for captures in LIKE_LITERAL.captures_iter(&upper) {
        let pattern = &captures[1];
        if pattern.starts_with('%') {
            report.push(Finding::LeadingWildcardLike {
                pattern: pattern.to_string(),
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_star_from_users_scores_80() {
        let report = check_performance("SELECT * FROM users");
        assert_eq!(report.findings, vec![Finding::SelectStar, Finding::FullTableScan]);
        assert_eq!(report.score(), 80);

        let record = report.to_record();
        assert_eq!(record.performance_score, Some(80));
        assert_eq!(record.performance_issues.len(), 1);
        assert!(record.warnings[0].contains("SELECT *"));
    }

    #[test]
    fn test_clean_query_scores_100() {
        let report = check_performance("SELECT id, name FROM users WHERE id = 7 LIMIT 1");
        assert!(report.findings.is_empty());
        assert_eq!(report.score(), 100);
    }

    #[test]
    fn test_cross_join_and_wildcard_like() {
        let report =
            check_performance("SELECT a.id FROM a CROSS JOIN b WHERE a.name LIKE '%son' LIMIT 5");
        assert_eq!(
            report.findings,
            vec![
                Finding::CrossJoin,
                Finding::LeadingWildcardLike { pattern: "%SON".to_string() },
            ]
        );
        assert_eq!(report.score(), 60);
    }

    #[test]
    fn test_subqueries_and_order_by_are_suggestions() {
        let sql = "SELECT id FROM t WHERE a IN (SELECT a FROM x) AND b IN (SELECT b FROM y) \
                   AND c IN ( select c FROM z) ORDER BY id";
        let report = check_performance(sql);
        assert!(report.findings.contains(&Finding::ManySubqueries { count: 3 }));
        assert!(report.findings.contains(&Finding::OrderByWithoutLimit));
        assert_eq!(report.score(), 100);
    }
}
