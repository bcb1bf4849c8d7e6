//! Conversation store access.
//!
//! The conversation document is the durable source of truth and the only
//! resource shared between server instances. Every state transition is a
//! single conditional write: the update only applies when the stored status
//! (and owner, where relevant) still matches, so concurrent callers need no
//! lock beyond the store itself.

pub mod conversation;
pub mod memory;

pub use conversation::PgConversationStore;
pub use memory::MemoryConversationStore;

use crate::models::{AgentInfo, Conversation, Message};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conversation {id} is malformed: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Everything written when an agent claims a requested conversation.
#[derive(Debug, Clone)]
pub struct Claim {
    pub agent_id: String,
    pub agent_info: AgentInfo,
    pub accepted_at: DateTime<Utc>,
    pub welcome: Message,
}

/// Condition an append must satisfy at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendGuard {
    /// Status is active.
    Active,
    /// Status is active and `accepted_by` equals the given agent.
    ActiveOwnedBy(String),
}

impl AppendGuard {
    pub fn admits(&self, conversation: &Conversation) -> bool {
        use crate::models::LiveChatStatus;

        if conversation.status() != LiveChatStatus::Active {
            return false;
        }
        match self {
            Self::Active => true,
            Self::ActiveOwnedBy(agent_id) => conversation.is_owned_by(agent_id),
        }
    }
}

/// Conditional operations return `Ok(None)` when the document is missing or
/// its state no longer matches; callers re-read to tell the two apart.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn fetch(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Existing conversations among `ids`, in the order of `ids`.
    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Conversation>, StoreError>;

    /// ai -> requested.
    async fn request_handoff(
        &self,
        id: Uuid,
        reason: Option<String>,
        requested_at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, StoreError>;

    /// requested -> active, appending the welcome message.
    async fn claim(&self, id: Uuid, claim: &Claim) -> Result<Option<Conversation>, StoreError>;

    /// active -> ended, appending the closing message.
    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        message: &Message,
    ) -> Result<Option<Conversation>, StoreError>;

    async fn append_message(
        &self,
        id: Uuid,
        message: &Message,
        guard: &AppendGuard,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Requested conversations of the given widgets, oldest request first.
    async fn list_requested(&self, widget_ids: &[String]) -> Result<Vec<Conversation>, StoreError>;
}
