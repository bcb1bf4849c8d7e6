use crate::models::{AgentInfo, Conversation, LiveChatStatus, Message};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Result of request/accept/end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: LiveChatStatus,
    pub agent_info: Option<AgentInfo>,
}

impl From<&Conversation> for StatusView {
    fn from(conversation: &Conversation) -> Self {
        Self {
            status: conversation.status(),
            agent_info: conversation.live_chat.agent_info.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub status: LiveChatStatus,
    pub agent_info: Option<AgentInfo>,
    pub new_messages: Vec<Message>,
    /// Newest message of the conversation, whatever the cursor was.
    pub last_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub conversation_id: Uuid,
    pub widget_name: String,
    pub organization_name: String,
    pub requested_at: Option<DateTime<Utc>>,
    pub wait_time_seconds: i64,
    pub handoff_reason: Option<String>,
    pub messages: Vec<Message>,
    pub message_count: i32,
}

/// A conversation the agent currently owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChat {
    pub conversation_id: Uuid,
    pub widget_id: String,
    pub status: LiveChatStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    pub last_message: Option<Message>,
    pub message_count: i32,
}

impl From<Conversation> for ActiveChat {
    fn from(conversation: Conversation) -> Self {
        let status = conversation.status();
        let message_count = conversation.message_count;
        Self {
            conversation_id: conversation.id,
            status,
            accepted_at: conversation.live_chat.accepted_at,
            last_message: conversation.messages.into_iter().last(),
            widget_id: conversation.widget_id,
            message_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub conversations: usize,
}
