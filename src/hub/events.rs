use crate::models::{AgentInfo, Conversation, LiveChatStatus, Message};
use actix_web::web::Bytes;
use serde::{Deserialize, Serialize};

/// What viewers of a conversation are told about. `position` is the index of
/// the message in the conversation; connections use it to detect duplicates
/// and gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HubEvent {
    Status {
        status: LiveChatStatus,
        #[serde(rename = "agentInfo")]
        agent_info: Option<AgentInfo>,
    },
    Message {
        position: usize,
        message: Message,
    },
}

impl HubEvent {
    pub fn status_of(conversation: &Conversation) -> Self {
        Self::Status {
            status: conversation.status(),
            agent_info: conversation.live_chat.agent_info.clone(),
        }
    }

    /// Event for the newest message, if any.
    pub fn latest_message_of(conversation: &Conversation) -> Option<Self> {
        let position = conversation.messages.len().checked_sub(1)?;
        Some(Self::message_at(conversation, position))
    }

    pub fn message_at(conversation: &Conversation, position: usize) -> Self {
        Self::Message {
            position,
            message: conversation.messages[position].clone(),
        }
    }

    /// Server-sent event frame.
    pub fn to_frame(&self) -> Bytes {
        match serde_json::to_string(self) {
            Ok(json) => Bytes::from(format!("data: {}\n\n", json)),
            Err(err) => {
                tracing::error!("Failed to encode hub event: {:?}", err);
                Bytes::new()
            }
        }
    }
}

/// SSE comment line; keeps proxies from timing out idle streams.
pub fn heartbeat_frame() -> Bytes {
    Bytes::from_static(b": heartbeat\n\n")
}
