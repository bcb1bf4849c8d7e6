use std::sync::Arc;

use crate::connectors::config::ConnectorConfig;
use crate::connectors::errors::ConnectorError;

use super::{InMemoryTeamService, TeamService, TeamServiceClient};

/// Initialize the Team Service connector from Settings.
///
/// A disabled or missing `connectors.team_service` section falls back to an
/// empty in-memory directory, which only makes sense for local runs.
pub fn init(connector_config: &ConnectorConfig) -> Result<Arc<dyn TeamService>, ConnectorError> {
    let connector: Arc<dyn TeamService> = match connector_config
        .team_service
        .as_ref()
        .filter(|c| c.enabled)
    {
        Some(config) => {
            tracing::info!("Initializing Team Service connector: {}", config.base_url);
            Arc::new(TeamServiceClient::new(config.clone())?)
        }
        None => {
            tracing::warn!("Team Service connector disabled - using in-memory directory");
            Arc::new(InMemoryTeamService::new())
        }
    };

    Ok(connector)
}
