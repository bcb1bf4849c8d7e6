use super::{AppendGuard, Claim, ConversationStore, StoreError};
use crate::models::{Conversation, LiveChatStatus, Message};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process conversation store. Every conditional update runs under the
/// write lock, which gives the same first-write-wins behaviour as the
/// Postgres `UPDATE ... WHERE status = ...` statements.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, conversation: Conversation) {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id, conversation);
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    async fn update_if<F>(&self, id: Uuid, apply: F) -> Option<Conversation>
    where
        F: FnOnce(&mut Conversation) -> bool + Send,
    {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id)?;
        if apply(conversation) {
            conversation.updated_at = Utc::now();
            Some(conversation.clone())
        } else {
            None
        }
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn fetch(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| conversations.get(id).cloned())
            .collect())
    }

    async fn request_handoff(
        &self,
        id: Uuid,
        reason: Option<String>,
        requested_at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .update_if(id, |conversation| {
                if conversation.status() != LiveChatStatus::Ai {
                    return false;
                }
                conversation.live_chat.status = LiveChatStatus::Requested;
                conversation.live_chat.requested_at = Some(requested_at);
                conversation.live_chat.handoff_reason = reason;
                true
            })
            .await)
    }

    async fn claim(&self, id: Uuid, claim: &Claim) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .update_if(id, |conversation| {
                if conversation.status() != LiveChatStatus::Requested {
                    return false;
                }
                let live_chat = &mut conversation.live_chat;
                live_chat.status = LiveChatStatus::Active;
                live_chat.accepted_by = Some(claim.agent_id.clone());
                live_chat.accepted_at = Some(claim.accepted_at);
                live_chat.agent_info = Some(claim.agent_info.clone());
                conversation.push_message(claim.welcome.clone());
                true
            })
            .await)
    }

    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        message: &Message,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .update_if(id, |conversation| {
                if conversation.status() != LiveChatStatus::Active {
                    return false;
                }
                conversation.live_chat.status = LiveChatStatus::Ended;
                conversation.live_chat.ended_at = Some(ended_at);
                conversation.push_message(message.clone());
                true
            })
            .await)
    }

    async fn append_message(
        &self,
        id: Uuid,
        message: &Message,
        guard: &AppendGuard,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .update_if(id, |conversation| {
                if !guard.admits(conversation) {
                    return false;
                }
                conversation.push_message(message.clone());
                true
            })
            .await)
    }

    async fn list_requested(&self, widget_ids: &[String]) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        let mut requested: Vec<Conversation> = conversations
            .values()
            .filter(|c| c.status() == LiveChatStatus::Requested)
            .filter(|c| widget_ids.contains(&c.widget_id))
            .cloned()
            .collect();
        // Same order as the Postgres store: NULLS LAST, then creation time.
        requested.sort_by_key(|c| {
            (
                c.live_chat.requested_at.is_none(),
                c.live_chat.requested_at,
                c.created_at,
            )
        });
        Ok(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentInfo;

    fn claim_for(agent_id: &str) -> Claim {
        let agent_info = AgentInfo {
            name: agent_id.to_string(),
            title: None,
            avatar: None,
        };
        Claim {
            agent_id: agent_id.to_string(),
            welcome: Message::agent("hello", agent_info.clone()),
            agent_info,
            accepted_at: Utc::now(),
        }
    }

    async fn requested_conversation(store: &MemoryConversationStore) -> Uuid {
        let conversation = Conversation::new("widget-1");
        let id = conversation.id;
        store.insert(conversation).await;
        store
            .request_handoff(id, Some("needs a human".into()), Utc::now())
            .await
            .unwrap()
            .expect("ai conversation accepts a handoff request");
        id
    }

    #[tokio::test]
    async fn claim_succeeds_only_once() {
        let store = MemoryConversationStore::new();
        let id = requested_conversation(&store).await;

        let first = store.claim(id, &claim_for("agent-a")).await.unwrap();
        let second = store.claim(id, &claim_for("agent-b")).await.unwrap();

        let first = first.expect("first claim wins");
        assert_eq!(first.accepted_by(), Some("agent-a"));
        assert_eq!(first.message_count, 1);
        assert!(second.is_none());

        let stored = store.fetch(id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_by(), Some("agent-a"));
    }

    #[tokio::test]
    async fn append_respects_owner_guard() {
        let store = MemoryConversationStore::new();
        let id = requested_conversation(&store).await;
        store.claim(id, &claim_for("agent-a")).await.unwrap();

        let intruder = store
            .append_message(
                id,
                &Message::system("x"),
                &AppendGuard::ActiveOwnedBy("agent-b".into()),
            )
            .await
            .unwrap();
        assert!(intruder.is_none());

        let owner = store
            .append_message(
                id,
                &Message::system("y"),
                &AppendGuard::ActiveOwnedBy("agent-a".into()),
            )
            .await
            .unwrap();
        assert_eq!(owner.unwrap().message_count, 2);
    }

    #[tokio::test]
    async fn close_requires_active() {
        let store = MemoryConversationStore::new();
        let id = requested_conversation(&store).await;

        let closed = store
            .close(id, Utc::now(), &Message::system("bye"))
            .await
            .unwrap();
        assert!(closed.is_none());
        assert_eq!(
            store.fetch(id).await.unwrap().unwrap().status(),
            LiveChatStatus::Requested
        );
    }

    #[tokio::test]
    async fn list_requested_is_oldest_first_and_scoped() {
        let store = MemoryConversationStore::new();
        let now = Utc::now();
        let mut ids = vec![];
        for (widget, age) in [("w1", 10), ("w2", 30), ("w1", 20), ("w3", 40)] {
            let conversation = Conversation::new(widget);
            let id = conversation.id;
            store.insert(conversation).await;
            store
                .request_handoff(id, None, now - chrono::Duration::seconds(age))
                .await
                .unwrap();
            ids.push(id);
        }

        let listed = store
            .list_requested(&["w1".to_string(), "w2".to_string()])
            .await
            .unwrap();
        let listed: Vec<Uuid> = listed.iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![ids[1], ids[2], ids[0]]);
    }

    #[tokio::test]
    async fn requests_without_timestamp_sort_last() {
        let store = MemoryConversationStore::new();

        let mut imported = Conversation::new("w1");
        imported.live_chat.status = LiveChatStatus::Requested;
        let imported_id = imported.id;
        store.insert(imported).await;

        let dated = requested_conversation(&store).await;

        let listed = store
            .list_requested(&["w1".to_string(), "widget-1".to_string()])
            .await
            .unwrap();
        let listed: Vec<Uuid> = listed.iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![dated, imported_id]);
    }
}
