use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Handoff state of a conversation. Only ever moves forward:
/// ai -> requested -> active -> ended.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LiveChatStatus {
    #[default]
    Ai,
    Requested,
    Active,
    Ended,
}

impl LiveChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Requested => "requested",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for LiveChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LiveChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(Self::Ai),
            "requested" => Ok(Self::Requested),
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(format!("unknown live chat status: {}", other)),
        }
    }
}

/// Agent display data, snapshotted onto the conversation at accept time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Agent,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds the reply took, for assistant messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<AgentInfo>,
}

impl Message {
    fn new(role: MessageRole, content: String, agent_info: Option<AgentInfo>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            response_time: None,
            agent_info,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into(), None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into(), None)
    }

    pub fn agent(content: impl Into<String>, agent_info: AgentInfo) -> Self {
        Self::new(MessageRole::Agent, content.into(), Some(agent_info))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content.into(), None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChat {
    pub status: LiveChatStatus,
    pub requested_at: Option<DateTime<Utc>>,
    pub handoff_reason: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    /// Set only while status is active or ended.
    pub accepted_by: Option<String>,
    pub agent_info: Option<AgentInfo>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub widget_id: String,
    pub messages: Vec<Message>,
    pub message_count: i32,
    pub live_chat: LiveChat,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(widget_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            widget_id: widget_id.into(),
            messages: vec![],
            message_count: 0,
            live_chat: LiveChat::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> LiveChatStatus {
        self.live_chat.status
    }

    pub fn accepted_by(&self) -> Option<&str> {
        self.live_chat.accepted_by.as_deref()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.accepted_by() == Some(user_id)
    }

    /// Appends and keeps `message_count` in sync.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.message_count = self.messages.len() as i32;
        self.updated_at = Utc::now();
    }

    pub fn position_of(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    /// Messages strictly after `cursor`, or all of them without a cursor.
    /// `None` when the cursor is not part of this conversation.
    pub fn messages_after(&self, cursor: Option<&str>) -> Option<&[Message]> {
        match cursor {
            None => Some(&self.messages),
            Some(id) => self.position_of(id).map(|pos| &self.messages[pos + 1..]),
        }
    }

    pub fn recent_messages(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    pub fn last_message_id(&self) -> Option<&str> {
        self.messages.last().map(|m| m.id.as_str())
    }
}
