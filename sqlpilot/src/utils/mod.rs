//! Small shared helpers: timestamps and SQL fingerprints.

mod digest;
pub mod timestamps;

pub use digest::{normalize_sql, short_digest, sql_digest};
pub use timestamps::{elapsed_ms, iso_timestamp, now_utc, Timestamp};

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_valid() {
        let id = generate_uuid();
        assert_eq!(id.get_version_num(), 4);
    }
}
