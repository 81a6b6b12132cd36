//! Health report served by the transport's `/health` command.

use serde::Serialize;

/// Overall status plus the state of each dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `healthy` when every check passed, otherwise `degraded`
    pub status: &'static str,
    /// `running` or `stopped`
    pub telegram_bot: &'static str,
    /// `connected` or `disconnected`
    pub database: &'static str,
}

impl HealthReport {
    /// Build a report from the two connectivity checks
    #[must_use]
    pub const fn from_checks(bot_running: bool, database_connected: bool) -> Self {
        Self {
            status: if bot_running && database_connected {
                "healthy"
            } else {
                "degraded"
            },
            telegram_bot: if bot_running { "running" } else { "stopped" },
            database: if database_connected {
                "connected"
            } else {
                "disconnected"
            },
        }
    }

    /// True when every check passed
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns the serializer error.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
