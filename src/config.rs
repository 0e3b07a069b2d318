//! Relay service configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for [`RelayService`](crate::service::RelayService).
///
/// The host constructs this from its own settings surface; every field has
/// a sensible default.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Path of the persisted trigger registry (JSON document).
    pub data_file: PathBuf,

    /// Whether the feature starts enabled.
    pub enabled: bool,

    /// Default item count for batch sends when the caller gives none.
    /// Clamped to a minimum of 1.
    pub default_view_count: usize,

    /// Display name used to label forward-bundle sub-messages.
    pub display_name: String,

    /// Timeout applied to text and diagnostic fetches.
    pub request_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("api_config.json"),
            enabled: true,
            default_view_count: 1,
            display_name: "bot".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Effective batch count for a request: the caller's count when given,
    /// otherwise the configured default, never below 1.
    pub fn effective_count(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_view_count).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_count_clamps_to_one() {
        let config = RelayConfig {
            default_view_count: 0,
            ..RelayConfig::default()
        };
        assert_eq!(config.effective_count(None), 1);
        assert_eq!(config.effective_count(Some(0)), 1);
        assert_eq!(config.effective_count(Some(3)), 3);
    }
}
