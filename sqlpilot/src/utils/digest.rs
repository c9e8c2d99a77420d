//! SQL fingerprints.

use sha2::{Digest, Sha256};

/// Collapses runs of whitespace and trims the statement.
#[must_use]
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex-encoded sha256 of the whitespace-normalized SQL.
///
/// Used to tie validation and execution records to the exact candidate
/// they judged, and as a stable identifier in audit logs.
#[must_use]
pub fn sql_digest(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_sql(sql).as_bytes());
    hex::encode(hasher.finalize())
}

/// First 12 hex characters of [`sql_digest`], for log lines.
#[must_use]
pub fn short_digest(sql: &str) -> String {
    let mut digest = sql_digest(sql);
    digest.truncate(12);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_ignores_layout() {
        assert_eq!(
            sql_digest("SELECT id\n  FROM users"),
            sql_digest("  SELECT id FROM users ")
        );
    }

    #[test]
    fn test_digest_distinguishes_statements() {
        assert_ne!(sql_digest("SELECT 1"), sql_digest("SELECT 2"));
        assert_eq!(sql_digest("SELECT 1").len(), 64);
        assert_eq!(short_digest("SELECT 1").len(), 12);
    }
}
