//! Typed validator findings.

use crate::state::ValidationKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a finding affects the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Fails the check (syntax error, security issue, scored performance issue).
    Error,
    /// Reported, does not fail the check.
    Warning,
    /// Improvement hint.
    Suggestion,
}

/// One defect found in a SQL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Finding {
    /// The parser rejected the statement.
    ParseError {
        /// Parser message.
        message: String,
    },
    /// The parser found no statement.
    EmptyStatement,
    /// A DDL/DML keyword appears in the text.
    DangerousKeyword {
        /// The keyword, uppercased.
        keyword: String,
    },
    /// No SELECT keyword.
    MissingSelect,
    /// `(` and `)` counts differ.
    UnbalancedParentheses {
        /// Count of `(`.
        open: usize,
        /// Count of `)`.
        close: usize,
    },
    /// Odd number of `'`.
    UnbalancedSingleQuotes,
    /// Odd number of `"`.
    UnbalancedDoubleQuotes,
    /// No LIMIT or TOP clause.
    MissingLimit,
    /// An injection signature matched.
    InjectionPattern {
        /// Short name of the signature.
        signature: String,
    },
    /// CONCAT or `||` in the text.
    StringConcatenation,
    /// A quote with no complete quoted literal.
    UnquotedInput,
    /// `SELECT *`.
    SelectStar,
    /// Neither WHERE nor LIMIT.
    FullTableScan,
    /// CROSS JOIN.
    CrossJoin,
    /// More than two nested `(SELECT`.
    ManySubqueries {
        /// Number of subqueries.
        count: usize,
    },
    /// ORDER BY without LIMIT.
    OrderByWithoutLimit,
    /// `LIKE '%...'`.
    LeadingWildcardLike {
        /// The pattern literal.
        pattern: String,
    },
}

impl Finding {
    /// The check that reports this finding.
    #[must_use]
    pub fn kind(&self) -> ValidationKind {
        match self {
            Self::ParseError { .. }
            | Self::EmptyStatement
            | Self::DangerousKeyword { .. }
            | Self::MissingSelect
            | Self::UnbalancedParentheses { .. }
            | Self::UnbalancedSingleQuotes
            | Self::UnbalancedDoubleQuotes
            | Self::MissingLimit => ValidationKind::Syntax,
            Self::InjectionPattern { .. } | Self::StringConcatenation | Self::UnquotedInput => {
                ValidationKind::Security
            }
            Self::SelectStar
            | Self::FullTableScan
            | Self::CrossJoin
            | Self::ManySubqueries { .. }
            | Self::OrderByWithoutLimit
            | Self::LeadingWildcardLike { .. } => ValidationKind::Performance,
        }
    }

    /// Severity of the finding.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::ParseError { .. }
            | Self::EmptyStatement
            | Self::DangerousKeyword { .. }
            | Self::MissingSelect
            | Self::UnbalancedParentheses { .. }
            | Self::InjectionPattern { .. }
            | Self::FullTableScan
            | Self::CrossJoin
            | Self::LeadingWildcardLike { .. } => Severity::Error,
            Self::UnbalancedSingleQuotes
            | Self::UnbalancedDoubleQuotes
            | Self::MissingLimit
            | Self::StringConcatenation
            | Self::UnquotedInput
            | Self::SelectStar => Severity::Warning,
            Self::ManySubqueries { .. } | Self::OrderByWithoutLimit => Severity::Suggestion,
        }
    }

    /// Returns true if the auto-fixer knows a textual repair for this finding.
    ///
    /// Security findings and dangerous keywords are never fixable.
    #[must_use]
    pub fn is_fixable(&self) -> bool {
        matches!(
            self,
            Self::UnbalancedParentheses { .. } | Self::MissingSelect | Self::MissingLimit
        )
    }

    /// Returns true if the SQL must be regenerated rather than patched.
    #[must_use]
    pub fn forbids_fix(&self) -> bool {
        matches!(self, Self::DangerousKeyword { .. } | Self::InjectionPattern { .. })
    }

    /// Returns true if this finding blocks execution.
    #[must_use]
    pub fn blocks_execution(&self) -> bool {
        self.severity() == Severity::Error
            && matches!(self.kind(), ValidationKind::Syntax | ValidationKind::Security)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError { message } => write!(f, "SQL syntax error: {message}"),
            Self::EmptyStatement => write!(f, "SQL could not be parsed into a statement"),
            Self::DangerousKeyword { keyword } => write!(f, "Dangerous operation: {keyword}"),
            Self::MissingSelect => write!(f, "Missing SELECT statement"),
            Self::UnbalancedParentheses { open, close } => {
                write!(f, "Unbalanced parentheses ({open} open, {close} close)")
            }
            Self::UnbalancedSingleQuotes => write!(f, "Single quotes may be unbalanced"),
            Self::UnbalancedDoubleQuotes => write!(f, "Double quotes may be unbalanced"),
            Self::MissingLimit => write!(f, "Missing LIMIT clause; add LIMIT to bound the result set"),
            Self::InjectionPattern { signature } => {
                write!(f, "Potential SQL injection pattern: {signature}")
            }
            Self::StringConcatenation => {
                write!(f, "String concatenation detected; make sure inputs are escaped")
            }
            Self::UnquotedInput => write!(f, "Possible unescaped user input"),
            Self::SelectStar => write!(f, "SELECT * may hurt performance; list the needed columns"),
            Self::FullTableScan => write!(f, "Missing WHERE/LIMIT may cause a full table scan"),
            Self::CrossJoin => write!(f, "CROSS JOIN may produce a cartesian product"),
            Self::ManySubqueries { count } => {
                write!(f, "{count} subqueries found; consider rewriting with JOIN")
            }
            Self::OrderByWithoutLimit => write!(f, "ORDER BY without LIMIT may hurt performance"),
            Self::LeadingWildcardLike { pattern } => {
                write!(f, "LIKE pattern '{pattern}' starts with a wildcard and cannot use an index")
            }
        }
    }
}
