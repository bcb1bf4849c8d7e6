use serde::{Deserialize, Serialize};

/// Configuration for external service connectors
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectorConfig {
    pub team_service: Option<TeamServiceConfig>,
}

/// Team Service connector configuration (organizations, widgets, agent profiles)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamServiceConfig {
    /// Enable/disable Team Service integration; disabled falls back to the in-memory directory
    pub enabled: bool,
    /// Base URL for Team Service API (e.g., http://localhost:4200/api)
    pub base_url: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Service token for inter-service authentication (from env: TEAM_SERVICE_AUTH_TOKEN)
    #[serde(skip)]
    pub auth_token: Option<String>,
}

impl Default for TeamServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:4200/api".to_string(),
            timeout_secs: 10,
            auth_token: None,
        }
    }
}
