use super::{AppendGuard, Claim, ConversationStore, StoreError};
use crate::models::{AgentInfo, Conversation, LiveChat, Message};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    widget_id: String,
    messages: Json<Vec<Message>>,
    message_count: i32,
    live_chat_status: String,
    requested_at: Option<DateTime<Utc>>,
    handoff_reason: Option<String>,
    accepted_at: Option<DateTime<Utc>>,
    accepted_by: Option<String>,
    agent_info: Option<Json<AgentInfo>>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let status = row
            .live_chat_status
            .parse()
            .map_err(|reason| StoreError::Corrupt { id: row.id, reason })?;

        Ok(Conversation {
            id: row.id,
            widget_id: row.widget_id,
            messages: row.messages.0,
            message_count: row.message_count,
            live_chat: LiveChat {
                status,
                requested_at: row.requested_at,
                handoff_reason: row.handoff_reason,
                accepted_at: row.accepted_at,
                accepted_by: row.accepted_by,
                agent_info: row.agent_info.map(|info| info.0),
                ended_at: row.ended_at,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_conversation(row: Option<ConversationRow>) -> Result<Option<Conversation>, StoreError> {
    row.map(Conversation::try_from).transpose()
}

/// Conversation documents in Postgres. Messages live in a JSONB array and
/// are only ever extended with `||`.
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a conversation document. Conversations normally originate in
    /// the widget backend; this is used for seeding and imports.
    #[tracing::instrument(name = "Insert conversation", skip(self, conversation), fields(id = %conversation.id))]
    pub async fn insert(&self, conversation: &Conversation) -> Result<Conversation, StoreError> {
        let query_span = tracing::info_span!("Saving conversation to database");
        let live_chat = &conversation.live_chat;
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            INSERT INTO conversations (
                id, widget_id, messages, message_count, live_chat_status,
                requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                ended_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, widget_id, messages, message_count, live_chat_status,
                      requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                      ended_at, created_at, updated_at
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.widget_id)
        .bind(Json(&conversation.messages))
        .bind(conversation.messages.len() as i32)
        .bind(live_chat.status.as_str())
        .bind(live_chat.requested_at)
        .bind(&live_chat.handoff_reason)
        .bind(live_chat.accepted_at)
        .bind(&live_chat.accepted_by)
        .bind(live_chat.agent_info.as_ref().map(Json))
        .bind(live_chat.ended_at)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_one(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to insert conversation: {:?}", err);
            err
        })?;

        row.try_into()
    }
}

#[async_trait::async_trait]
impl ConversationStore for PgConversationStore {
    #[tracing::instrument(name = "Fetch conversation", skip(self))]
    async fn fetch(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let query_span = tracing::info_span!("Fetching conversation by ID");
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, widget_id, messages, message_count, live_chat_status,
                   requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                   ended_at, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to fetch conversation: {:?}", err);
            err
        })?;

        into_conversation(row)
    }

    #[tracing::instrument(name = "Fetch conversations", skip(self, ids), fields(count = ids.len()))]
    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Conversation>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let query_span = tracing::info_span!("Fetching conversations by IDs");
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, widget_id, messages, message_count, live_chat_status,
                   requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                   ended_at, created_at, updated_at
            FROM conversations
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to fetch conversations: {:?}", err);
            err
        })?;

        let mut conversations = rows
            .into_iter()
            .map(Conversation::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        conversations.sort_by_key(|c| ids.iter().position(|id| *id == c.id));

        Ok(conversations)
    }

    #[tracing::instrument(name = "Request handoff", skip(self))]
    async fn request_handoff(
        &self,
        id: Uuid,
        reason: Option<String>,
        requested_at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, StoreError> {
        let query_span = tracing::info_span!("Marking conversation as requested");
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            UPDATE conversations
            SET live_chat_status = 'requested',
                requested_at = $2,
                handoff_reason = $3,
                updated_at = NOW()
            WHERE id = $1 AND live_chat_status = 'ai'
            RETURNING id, widget_id, messages, message_count, live_chat_status,
                      requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                      ended_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(requested_at)
        .bind(reason)
        .fetch_optional(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to request handoff: {:?}", err);
            err
        })?;

        into_conversation(row)
    }

    #[tracing::instrument(name = "Claim conversation", skip(self, claim), fields(agent = %claim.agent_id))]
    async fn claim(&self, id: Uuid, claim: &Claim) -> Result<Option<Conversation>, StoreError> {
        let query_span = tracing::info_span!("Claiming requested conversation");
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            UPDATE conversations
            SET live_chat_status = 'active',
                accepted_by = $2,
                accepted_at = $3,
                agent_info = $4,
                messages = messages || jsonb_build_array($5::jsonb),
                message_count = message_count + 1,
                updated_at = NOW()
            WHERE id = $1 AND live_chat_status = 'requested'
            RETURNING id, widget_id, messages, message_count, live_chat_status,
                      requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                      ended_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&claim.agent_id)
        .bind(claim.accepted_at)
        .bind(Json(&claim.agent_info))
        .bind(Json(&claim.welcome))
        .fetch_optional(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to claim conversation: {:?}", err);
            err
        })?;

        into_conversation(row)
    }

    #[tracing::instrument(name = "Close conversation", skip(self, message))]
    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        message: &Message,
    ) -> Result<Option<Conversation>, StoreError> {
        let query_span = tracing::info_span!("Closing active conversation");
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            UPDATE conversations
            SET live_chat_status = 'ended',
                ended_at = $2,
                messages = messages || jsonb_build_array($3::jsonb),
                message_count = message_count + 1,
                updated_at = NOW()
            WHERE id = $1 AND live_chat_status = 'active'
            RETURNING id, widget_id, messages, message_count, live_chat_status,
                      requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                      ended_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(ended_at)
        .bind(Json(message))
        .fetch_optional(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to close conversation: {:?}", err);
            err
        })?;

        into_conversation(row)
    }

    #[tracing::instrument(name = "Append message", skip(self, message), fields(message_id = %message.id))]
    async fn append_message(
        &self,
        id: Uuid,
        message: &Message,
        guard: &AppendGuard,
    ) -> Result<Option<Conversation>, StoreError> {
        let owner = match guard {
            AppendGuard::Active => None,
            AppendGuard::ActiveOwnedBy(agent_id) => Some(agent_id.as_str()),
        };

        let query_span = tracing::info_span!("Appending message to conversation");
        // $3 IS NULL skips the owner check for end-user messages
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            UPDATE conversations
            SET messages = messages || jsonb_build_array($2::jsonb),
                message_count = message_count + 1,
                updated_at = NOW()
            WHERE id = $1
              AND live_chat_status = 'active'
              AND ($3::text IS NULL OR accepted_by = $3)
            RETURNING id, widget_id, messages, message_count, live_chat_status,
                      requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                      ended_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(Json(message))
        .bind(owner)
        .fetch_optional(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to append message: {:?}", err);
            err
        })?;

        into_conversation(row)
    }

    #[tracing::instrument(name = "List requested conversations", skip(self, widget_ids), fields(widgets = widget_ids.len()))]
    async fn list_requested(&self, widget_ids: &[String]) -> Result<Vec<Conversation>, StoreError> {
        if widget_ids.is_empty() {
            return Ok(vec![]);
        }

        let query_span = tracing::info_span!("Fetching requested conversations");
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, widget_id, messages, message_count, live_chat_status,
                   requested_at, handoff_reason, accepted_at, accepted_by, agent_info,
                   ended_at, created_at, updated_at
            FROM conversations
            WHERE live_chat_status = 'requested' AND widget_id = ANY($1)
            ORDER BY requested_at ASC NULLS LAST, created_at ASC
            "#,
        )
        .bind(widget_ids.to_vec())
        .fetch_all(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to fetch requested conversations: {:?}", err);
            err
        })?;

        rows.into_iter().map(Conversation::try_from).collect()
    }
}
