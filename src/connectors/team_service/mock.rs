use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::connectors::errors::ConnectorError;
use crate::models::{AgentProfile, MemberRole, Membership, Organization, Widget};

use super::TeamService;

#[derive(Default)]
struct Directory {
    organizations: HashMap<String, Organization>,
    widgets: HashMap<String, Widget>,
    memberships: Vec<Membership>,
    agents: HashMap<String, AgentProfile>,
}

/// In-memory Team Service, used when the connector is disabled and in tests.
#[derive(Default)]
pub struct InMemoryTeamService {
    directory: RwLock<Directory>,
}

impl InMemoryTeamService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_organization(&self, id: &str, name: &str) {
        let mut directory = self.directory.write().await;
        directory.organizations.insert(
            id.to_string(),
            Organization {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
    }

    pub async fn add_widget(&self, id: &str, name: &str, organization_id: &str) {
        let mut directory = self.directory.write().await;
        directory.widgets.insert(
            id.to_string(),
            Widget {
                id: id.to_string(),
                name: name.to_string(),
                organization_id: organization_id.to_string(),
            },
        );
    }

    pub async fn add_member(&self, organization_id: &str, user_id: &str, role: MemberRole) {
        let mut directory = self.directory.write().await;
        directory
            .memberships
            .retain(|m| !(m.organization_id == organization_id && m.user_id == user_id));
        directory.memberships.push(Membership {
            organization_id: organization_id.to_string(),
            user_id: user_id.to_string(),
            role,
            active: true,
        });
    }

    pub async fn deactivate_member(&self, organization_id: &str, user_id: &str) {
        let mut directory = self.directory.write().await;
        for membership in directory.memberships.iter_mut() {
            if membership.organization_id == organization_id && membership.user_id == user_id {
                membership.active = false;
            }
        }
    }

    pub async fn add_agent(&self, profile: AgentProfile) {
        let mut directory = self.directory.write().await;
        directory.agents.insert(profile.user_id.clone(), profile);
    }
}

#[async_trait::async_trait]
impl TeamService for InMemoryTeamService {
    async fn widget(&self, widget_id: &str) -> Result<Option<Widget>, ConnectorError> {
        Ok(self.directory.read().await.widgets.get(widget_id).cloned())
    }

    async fn membership(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>, ConnectorError> {
        Ok(self
            .directory
            .read()
            .await
            .memberships
            .iter()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn active_organizations(
        &self,
        user_id: &str,
    ) -> Result<Vec<Organization>, ConnectorError> {
        let directory = self.directory.read().await;
        Ok(directory
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.active)
            .filter_map(|m| directory.organizations.get(&m.organization_id).cloned())
            .collect())
    }

    async fn widgets_for(
        &self,
        organization_ids: &[String],
    ) -> Result<Vec<Widget>, ConnectorError> {
        let directory = self.directory.read().await;
        Ok(directory
            .widgets
            .values()
            .filter(|w| organization_ids.contains(&w.organization_id))
            .cloned()
            .collect())
    }

    async fn agent_profile(&self, user_id: &str) -> Result<Option<AgentProfile>, ConnectorError> {
        Ok(self.directory.read().await.agents.get(user_id).cloned())
    }

    async fn add_active_chat(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), ConnectorError> {
        let mut directory = self.directory.write().await;
        let agent = directory
            .agents
            .get_mut(user_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("agent {}", user_id)))?;
        if !agent.current_active_chats.contains(&conversation_id) {
            agent.current_active_chats.push(conversation_id);
        }
        Ok(())
    }

    async fn remove_active_chat(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), ConnectorError> {
        let mut directory = self.directory.write().await;
        if let Some(agent) = directory.agents.get_mut(user_id) {
            agent.current_active_chats.retain(|id| *id != conversation_id);
        }
        Ok(())
    }

    async fn set_availability(
        &self,
        user_id: &str,
        is_available: bool,
    ) -> Result<AgentProfile, ConnectorError> {
        let mut directory = self.directory.write().await;
        let agent = directory
            .agents
            .get_mut(user_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("agent {}", user_id)))?;
        agent.is_available = is_available;
        Ok(agent.clone())
    }
}
