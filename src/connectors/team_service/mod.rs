//! Team Service connector: organizations, memberships, widgets and agent
//! profiles. All of it is owned by another service; live chat only reads it,
//! except for the agent's active-chat list and availability flag.

mod client;
mod init;
pub mod mock;

pub use client::TeamServiceClient;
pub use init::init;
pub use mock::InMemoryTeamService;

use super::errors::ConnectorError;
use crate::models::{AgentProfile, Membership, Organization, Widget};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait TeamService: Send + Sync {
    async fn widget(&self, widget_id: &str) -> Result<Option<Widget>, ConnectorError>;

    async fn membership(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>, ConnectorError>;

    /// Organizations where the user holds an active membership.
    async fn active_organizations(&self, user_id: &str)
        -> Result<Vec<Organization>, ConnectorError>;

    async fn widgets_for(&self, organization_ids: &[String])
        -> Result<Vec<Widget>, ConnectorError>;

    async fn agent_profile(&self, user_id: &str) -> Result<Option<AgentProfile>, ConnectorError>;

    async fn add_active_chat(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), ConnectorError>;

    async fn remove_active_chat(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), ConnectorError>;

    async fn set_availability(
        &self,
        user_id: &str,
        is_available: bool,
    ) -> Result<AgentProfile, ConnectorError>;
}
