use crate::connectors::ConnectorConfig;
use serde;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub app_port: u16,
    pub app_host: String,
    pub auth_url: String,
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub live_chat: LiveChatSettings,
    #[serde(default)]
    pub connectors: ConnectorConfig,
    #[serde(default)]
    pub bridge: BridgeSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
}

/// Tuning for the connection registry and the per-connection tasks.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Store re-check interval per open connection. 0 disables the re-check.
    pub poll_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Messages replayed to a new subscriber.
    pub backlog_size: usize,
    /// Inbound event queue size per connection.
    pub channel_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            heartbeat_interval_secs: 30,
            backlog_size: 10,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct LiveChatSettings {
    /// `{name}` is replaced with the agent's display name.
    pub welcome_message: String,
    pub ended_message: String,
    pub queue_preview_size: usize,
}

impl Default for LiveChatSettings {
    fn default() -> Self {
        Self {
            welcome_message: "Hi, this is {name}. I'm taking over from here.".to_string(),
            ended_message: "The chat session has ended.".to_string(),
            queue_preview_size: 10,
        }
    }
}

impl LiveChatSettings {
    pub fn welcome_for(&self, agent_name: &str) -> String {
        self.welcome_message.replace("{name}", agent_name)
    }
}

/// Cross-instance pub/sub for hub broadcasts.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub enabled: bool,
    pub redis_url: String,
    pub channel_prefix: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: "redis://127.0.0.1/".to_string(),
            channel_prefix: "livechat".to_string(),
        }
    }
}

impl DatabaseSettings {
    // Connection string: postgresql://<username>:<password>@<host>:<port>/<database_name>
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name,
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port,
        )
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration"))
        // e.g. LIVECHAT__HUB__POLL_INTERVAL_SECS=5
        .add_source(config::Environment::with_prefix("LIVECHAT").separator("__"))
        .build()?;

    let mut config: Settings = settings.try_deserialize()?;

    if let Some(team_service) = config.connectors.team_service.as_mut() {
        if team_service.auth_token.is_none() {
            team_service.auth_token = std::env::var("TEAM_SERVICE_AUTH_TOKEN").ok();
        }
    }

    Ok(config)
}
