//! Handoff state machine and the operations around it.
//!
//! Every mutation follows the same shape: read the conversation, reject
//! anything that is not allowed without touching the store, then perform one
//! conditional write. When the write does not apply, the conversation is read
//! again to report why. Viewers are told about committed changes through the
//! hub; a failed broadcast never fails the operation.

mod error;
#[cfg(test)]
mod tests;

pub use error::LiveChatError;

use crate::configuration::LiveChatSettings;
use crate::connectors::TeamService;
use crate::db::{AppendGuard, Claim, ConversationStore};
use crate::hub::{Hub, HubEvent};
use crate::models::{AgentInfo, Conversation, LiveChatStatus, Message, User, Widget};
use crate::views::live_chat::{ActiveChat, Availability, PollResult, QueueEntry, StatusView};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct LiveChatService {
    store: Arc<dyn ConversationStore>,
    team: Arc<dyn TeamService>,
    hub: Arc<Hub>,
    settings: LiveChatSettings,
}

impl LiveChatService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        team: Arc<dyn TeamService>,
        hub: Arc<Hub>,
        settings: LiveChatSettings,
    ) -> Self {
        Self {
            store,
            team,
            hub,
            settings,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Conversation, LiveChatError> {
        self.store
            .fetch(id)
            .await?
            .ok_or_else(LiveChatError::conversation_not_found)
    }

    async fn widget_of(&self, conversation: &Conversation) -> Result<Widget, LiveChatError> {
        self.team
            .widget(&conversation.widget_id)
            .await?
            .ok_or_else(|| LiveChatError::NotFound("Widget not found".to_string()))
    }

    async fn is_active_member(&self, organization_id: &str, user_id: &str) -> Result<bool, LiveChatError> {
        Ok(self
            .team
            .membership(organization_id, user_id)
            .await?
            .map_or(false, |membership| membership.active))
    }

    fn notify_status(&self, conversation: &Conversation) {
        self.hub
            .broadcast(conversation.id, HubEvent::status_of(conversation));
    }

    fn notify_message(&self, conversation: &Conversation, message_id: &str) {
        match conversation.position_of(message_id) {
            Some(position) => {
                self.hub
                    .broadcast(conversation.id, HubEvent::message_at(conversation, position));
            }
            None => tracing::warn!(
                conversation_id = %conversation.id,
                message_id = message_id,
                "Appended message missing from returned conversation"
            ),
        }
    }

    /// ai -> requested. Repeating the request while it is pending is a no-op.
    #[tracing::instrument(name = "Request handoff", skip(self))]
    pub async fn request_handoff(
        &self,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<StatusView, LiveChatError> {
        let conversation = self.load(id).await?;
        match conversation.status() {
            LiveChatStatus::Ai => {}
            LiveChatStatus::Requested => return Ok(StatusView::from(&conversation)),
            status => {
                return Err(LiveChatError::InvalidState(format!(
                    "Cannot request an agent for a conversation that is {}",
                    status
                )))
            }
        }

        match self.store.request_handoff(id, reason, Utc::now()).await? {
            Some(updated) => {
                tracing::info!(conversation_id = %id, "Agent requested");
                self.notify_status(&updated);
                Ok(StatusView::from(&updated))
            }
            None => {
                let current = self.load(id).await?;
                if current.status() == LiveChatStatus::Requested {
                    Ok(StatusView::from(&current))
                } else {
                    Err(LiveChatError::InvalidState(format!(
                        "Conversation is {}",
                        current.status()
                    )))
                }
            }
        }
    }

    /// requested -> active for the calling agent. First writer wins; the
    /// current owner may call again without effect.
    #[tracing::instrument(name = "Accept live chat", skip(self, caller), fields(agent = %caller.id))]
    pub async fn accept(&self, id: Uuid, caller: &User) -> Result<StatusView, LiveChatError> {
        let conversation = self.load(id).await?;
        let widget = self.widget_of(&conversation).await?;

        if !self.is_active_member(&widget.organization_id, &caller.id).await? {
            return Err(LiveChatError::Forbidden(
                "Not a member of this organization".to_string(),
            ));
        }

        let profile = self
            .team
            .agent_profile(&caller.id)
            .await?
            .ok_or_else(|| LiveChatError::Forbidden("No agent profile".to_string()))?;
        if !profile.is_available {
            return Err(LiveChatError::Forbidden(
                "Agent is not available".to_string(),
            ));
        }

        match conversation.status() {
            LiveChatStatus::Requested => {}
            LiveChatStatus::Active => return owner_or_conflict(&conversation, &caller.id),
            status => {
                return Err(LiveChatError::InvalidState(format!(
                    "Cannot accept a conversation that is {}",
                    status
                )))
            }
        }

        let agent_info = profile.agent_info();
        let claim = Claim {
            agent_id: caller.id.clone(),
            welcome: Message::agent(self.settings.welcome_for(&agent_info.name), agent_info.clone()),
            agent_info,
            accepted_at: Utc::now(),
        };

        let Some(updated) = self.store.claim(id, &claim).await? else {
            let current = self.load(id).await?;
            return match current.status() {
                LiveChatStatus::Active | LiveChatStatus::Ended => owner_or_conflict(&current, &caller.id),
                status => Err(LiveChatError::InvalidState(format!(
                    "Conversation is {}",
                    status
                ))),
            };
        };

        tracing::info!(conversation_id = %id, "Live chat accepted");

        if let Err(err) = self.team.add_active_chat(&caller.id, id).await {
            tracing::error!(conversation_id = %id, "Failed to record active chat: {}", err);
        }

        self.notify_status(&updated);
        self.notify_message(&updated, &claim.welcome.id);

        Ok(StatusView::from(&updated))
    }

    /// active -> ended, by the owning agent or an organization admin.
    #[tracing::instrument(name = "End live chat", skip(self, caller), fields(caller = %caller.id))]
    pub async fn end(&self, id: Uuid, caller: &User) -> Result<StatusView, LiveChatError> {
        let conversation = self.load(id).await?;

        // Authorization first, so outsiders learn nothing about the state.
        let is_owner = conversation.is_owned_by(&caller.id);
        if !is_owner && !self.can_manage(&conversation, &caller.id).await? {
            return Err(LiveChatError::Forbidden(
                "Only the accepting agent or an organization admin can end this chat".to_string(),
            ));
        }

        if conversation.status() != LiveChatStatus::Active {
            return Err(LiveChatError::InvalidState(format!(
                "Cannot end a conversation that is {}",
                conversation.status()
            )));
        }

        let closing = Message::system(self.settings.ended_message.clone());
        let Some(updated) = self.store.close(id, Utc::now(), &closing).await? else {
            let current = self.load(id).await?;
            return Err(LiveChatError::InvalidState(format!(
                "Conversation is {}",
                current.status()
            )));
        };

        tracing::info!(conversation_id = %id, "Live chat ended");

        if is_owner {
            if let Err(err) = self.team.remove_active_chat(&caller.id, id).await {
                tracing::error!(conversation_id = %id, "Failed to clear active chat: {}", err);
            }
        }

        self.notify_status(&updated);
        self.notify_message(&updated, &closing.id);

        Ok(StatusView::from(&updated))
    }

    async fn can_manage(&self, conversation: &Conversation, user_id: &str) -> Result<bool, LiveChatError> {
        let Some(widget) = self.team.widget(&conversation.widget_id).await? else {
            return Ok(false);
        };
        Ok(self
            .team
            .membership(&widget.organization_id, user_id)
            .await?
            .map_or(false, |membership| membership.active && membership.role.can_manage()))
    }

    /// Agent reply in an active chat the caller owns.
    #[tracing::instrument(name = "Send agent message", skip(self, caller, content), fields(agent = %caller.id))]
    pub async fn send_message(
        &self,
        id: Uuid,
        caller: &User,
        content: &str,
    ) -> Result<Message, LiveChatError> {
        let content = non_blank(content)?;
        let conversation = self.load(id).await?;
        if conversation.status() != LiveChatStatus::Active {
            return Err(LiveChatError::InvalidState(format!(
                "Cannot send to a conversation that is {}",
                conversation.status()
            )));
        }
        if !conversation.is_owned_by(&caller.id) {
            return Err(LiveChatError::Forbidden(
                "Only the accepting agent can reply".to_string(),
            ));
        }

        let agent_info = conversation
            .live_chat
            .agent_info
            .clone()
            .unwrap_or_else(|| AgentInfo {
                name: caller.display_name(),
                title: None,
                avatar: None,
            });
        let message = Message::agent(content, agent_info);

        self.append(id, message, AppendGuard::ActiveOwnedBy(caller.id.clone()))
            .await
    }

    /// End-user message while an agent holds the chat.
    #[tracing::instrument(name = "Send user message", skip(self, content))]
    pub async fn user_message(&self, id: Uuid, content: &str) -> Result<Message, LiveChatError> {
        let content = non_blank(content)?;
        let conversation = self.load(id).await?;
        if conversation.status() != LiveChatStatus::Active {
            return Err(LiveChatError::InvalidState(format!(
                "No agent is connected; conversation is {}",
                conversation.status()
            )));
        }

        self.append(id, Message::user(content), AppendGuard::Active)
            .await
    }

    async fn append(
        &self,
        id: Uuid,
        message: Message,
        guard: AppendGuard,
    ) -> Result<Message, LiveChatError> {
        let Some(updated) = self.store.append_message(id, &message, &guard).await? else {
            let current = self.load(id).await?;
            return Err(match guard {
                AppendGuard::ActiveOwnedBy(_) if current.status() == LiveChatStatus::Active => {
                    LiveChatError::Forbidden("Only the accepting agent can reply".to_string())
                }
                _ => LiveChatError::InvalidState(format!("Conversation is {}", current.status())),
            });
        };

        self.notify_message(&updated, &message.id);
        Ok(message)
    }

    /// Status and messages after `last_message_id`, for clients without a
    /// live connection.
    #[tracing::instrument(name = "Poll live chat", skip(self))]
    pub async fn poll(
        &self,
        id: Uuid,
        last_message_id: Option<&str>,
    ) -> Result<PollResult, LiveChatError> {
        let conversation = self.load(id).await?;
        let new_messages = conversation
            .messages_after(last_message_id)
            .map(<[Message]>::to_vec)
            .unwrap_or_default();

        Ok(PollResult {
            status: conversation.status(),
            agent_info: conversation.live_chat.agent_info.clone(),
            new_messages,
            last_message_id: conversation.last_message_id().map(str::to_string),
        })
    }

    /// Conversations waiting for an agent in the caller's organizations,
    /// longest waiting first.
    #[tracing::instrument(name = "Live chat queue", skip(self, caller), fields(agent = %caller.id))]
    pub async fn queue(&self, caller: &User) -> Result<Vec<QueueEntry>, LiveChatError> {
        let organizations = self.team.active_organizations(&caller.id).await?;
        if organizations.is_empty() {
            return Ok(vec![]);
        }

        let organization_ids: Vec<String> = organizations.iter().map(|o| o.id.clone()).collect();
        let organization_names: HashMap<&str, &str> = organizations
            .iter()
            .map(|o| (o.id.as_str(), o.name.as_str()))
            .collect();

        let widgets = self.team.widgets_for(&organization_ids).await?;
        if widgets.is_empty() {
            return Ok(vec![]);
        }
        let widget_ids: Vec<String> = widgets.iter().map(|w| w.id.clone()).collect();
        let widgets: HashMap<&str, &Widget> = widgets.iter().map(|w| (w.id.as_str(), w)).collect();

        let now = Utc::now();
        let entries = self
            .store
            .list_requested(&widget_ids)
            .await?
            .into_iter()
            .filter_map(|conversation| {
                let widget = widgets.get(conversation.widget_id.as_str())?;
                let organization_name = organization_names
                    .get(widget.organization_id.as_str())
                    .copied()
                    .unwrap_or_default();
                let wait_time_seconds = conversation
                    .live_chat
                    .requested_at
                    .map_or(0, |requested_at| (now - requested_at).num_seconds().max(0));

                Some(QueueEntry {
                    conversation_id: conversation.id,
                    widget_name: widget.name.clone(),
                    organization_name: organization_name.to_string(),
                    requested_at: conversation.live_chat.requested_at,
                    wait_time_seconds,
                    handoff_reason: conversation.live_chat.handoff_reason.clone(),
                    messages: conversation
                        .recent_messages(self.settings.queue_preview_size)
                        .to_vec(),
                    message_count: conversation.message_count,
                })
            })
            .collect();

        Ok(entries)
    }

    /// Conversations listed in the caller's active chats, in that order.
    #[tracing::instrument(name = "Active live chats", skip(self, caller), fields(agent = %caller.id))]
    pub async fn active_chats(&self, caller: &User) -> Result<Vec<ActiveChat>, LiveChatError> {
        let Some(profile) = self.team.agent_profile(&caller.id).await? else {
            return Ok(vec![]);
        };
        let conversations = self.store.fetch_many(&profile.current_active_chats).await?;
        Ok(conversations.into_iter().map(ActiveChat::from).collect())
    }

    #[tracing::instrument(name = "Set agent availability", skip(self, caller), fields(agent = %caller.id))]
    pub async fn set_availability(
        &self,
        caller: &User,
        is_available: bool,
    ) -> Result<Availability, LiveChatError> {
        let profile = self.team.set_availability(&caller.id, is_available).await?;
        Ok(Availability {
            is_available: profile.is_available,
        })
    }
}

fn owner_or_conflict(conversation: &Conversation, caller_id: &str) -> Result<StatusView, LiveChatError> {
    match conversation.accepted_by() {
        Some(owner) if owner == caller_id => match conversation.status() {
            LiveChatStatus::Active => Ok(StatusView::from(conversation)),
            status => Err(LiveChatError::InvalidState(format!(
                "Conversation is {}",
                status
            ))),
        },
        Some(owner) => Err(LiveChatError::Conflict {
            accepted_by: owner.to_string(),
        }),
        None => Err(LiveChatError::InvalidState(format!(
            "Conversation is {}",
            conversation.status()
        ))),
    }
}

fn non_blank(content: &str) -> Result<&str, LiveChatError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LiveChatError::Validation(
            "Message content must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
