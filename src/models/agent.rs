use super::AgentInfo;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Agent-facing part of a user profile, owned by the team service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub is_available: bool,
    #[serde(default)]
    pub current_active_chats: Vec<Uuid>,
}

impl AgentProfile {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            title: None,
            avatar: None,
            is_available: true,
            current_active_chats: vec![],
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.is_available = false;
        self
    }

    pub fn agent_info(&self) -> AgentInfo {
        AgentInfo {
            name: self.display_name.clone(),
            title: self.title.clone(),
            avatar: self.avatar.clone(),
        }
    }
}
