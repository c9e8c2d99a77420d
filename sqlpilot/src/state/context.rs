//! Per-run caller context.

use serde::{Deserialize, Serialize};

/// Identifies the caller and the target database for a run.
///
/// Passed by reference to every agent alongside the state. Agents never
/// mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Target database connection.
    pub connection_id: i64,
    /// Caller identity, used only for audit lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl UserContext {
    /// Creates a context for `connection_id`.
    #[must_use]
    pub fn new(connection_id: i64) -> Self {
        Self {
            connection_id,
            user_id: None,
        }
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
