use super::*;
use crate::configuration::HubSettings;
use crate::connectors::InMemoryTeamService;
use crate::db::MemoryConversationStore;
use crate::models::{AgentProfile, MemberRole, MessageRole};
use actix_web::web::Bytes;
use chrono::Duration;
use futures_util::StreamExt;

struct Fixture {
    store: Arc<MemoryConversationStore>,
    team: Arc<InMemoryTeamService>,
    hub: Arc<Hub>,
    service: LiveChatService,
}

fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        first_name: id.to_string(),
        ..Default::default()
    }
}

fn requested(widget_id: &str, waiting_for: i64) -> Conversation {
    let mut conversation = Conversation::new(widget_id);
    conversation.push_message(Message::user("I need a human"));
    conversation.push_message(Message::assistant("Let me find someone"));
    conversation.live_chat.status = LiveChatStatus::Requested;
    conversation.live_chat.requested_at = Some(Utc::now() - Duration::seconds(waiting_for));
    conversation.live_chat.handoff_reason = Some("billing".to_string());
    conversation
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryConversationStore::new());
    let team = Arc::new(InMemoryTeamService::new());

    team.add_organization("org-1", "Acme").await;
    team.add_organization("org-2", "Globex").await;
    team.add_widget("widget-1", "Support", "org-1").await;
    team.add_widget("widget-2", "Sales", "org-2").await;
    team.add_member("org-1", "agent-a", MemberRole::Member).await;
    team.add_member("org-1", "agent-b", MemberRole::Member).await;
    team.add_member("org-1", "member-c", MemberRole::Member).await;
    team.add_member("org-1", "admin", MemberRole::Admin).await;
    team.add_agent(AgentProfile::new("agent-a", "Alice").with_title("Support lead"))
        .await;
    team.add_agent(AgentProfile::new("agent-b", "Bob")).await;
    team.add_agent(AgentProfile::new("member-c", "Carol").unavailable())
        .await;

    let hub_settings = HubSettings {
        poll_interval_secs: 0,
        ..HubSettings::default()
    };
    let hub = Arc::new(Hub::new(store.clone(), hub_settings, None));
    let service = LiveChatService::new(
        store.clone(),
        team.clone(),
        hub.clone(),
        LiveChatSettings::default(),
    );

    Fixture {
        store,
        team,
        hub,
        service,
    }
}

impl Fixture {
    async fn seed(&self, conversation: Conversation) -> Uuid {
        let id = conversation.id;
        self.store.insert(conversation).await;
        id
    }

    async fn current(&self, id: Uuid) -> Conversation {
        self.store.fetch(id).await.unwrap().unwrap()
    }

    async fn active_chats_of(&self, user_id: &str) -> Vec<Uuid> {
        self.team
            .agent_profile(user_id)
            .await
            .unwrap()
            .unwrap()
            .current_active_chats
    }
}

#[tokio::test]
async fn accept_claims_conversation_and_welcomes_user() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;

    let result = f.service.accept(id, &user("agent-a")).await.unwrap();
    assert_eq!(result.status, LiveChatStatus::Active);
    assert_eq!(result.agent_info.as_ref().unwrap().name, "Alice");

    let conversation = f.current(id).await;
    assert_eq!(conversation.accepted_by(), Some("agent-a"));
    assert!(conversation.live_chat.accepted_at.is_some());
    assert_eq!(conversation.message_count, 3);

    let welcome = conversation.messages.last().unwrap();
    assert_eq!(welcome.role, MessageRole::Agent);
    assert_eq!(welcome.content, "Hi, this is Alice. I'm taking over from here.");
    assert_eq!(welcome.agent_info.as_ref().unwrap().title.as_deref(), Some("Support lead"));

    assert_eq!(f.active_chats_of("agent-a").await, vec![id]);
}

#[tokio::test]
async fn second_accept_conflicts_with_winner() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;

    f.service.accept(id, &user("agent-a")).await.unwrap();
    let err = f.service.accept(id, &user("agent-b")).await.unwrap_err();

    match err {
        LiveChatError::Conflict { accepted_by } => assert_eq!(accepted_by, "agent-a"),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert!(f.active_chats_of("agent-b").await.is_empty());
}

#[tokio::test]
async fn concurrent_accepts_have_exactly_one_winner() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;
    let (a, b) = (user("agent-a"), user("agent-b"));

    let (first, second) = tokio::join!(f.service.accept(id, &a), f.service.accept(id, &b));

    let winner = f.current(id).await.accepted_by().unwrap().to_string();
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let conflict = outcomes.iter().find_map(|r| match r {
        Err(LiveChatError::Conflict { accepted_by }) => Some(accepted_by.clone()),
        _ => None,
    });
    assert_eq!(conflict, Some(winner));

    let agent_messages = f
        .current(id)
        .await
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::Agent)
        .count();
    assert_eq!(agent_messages, 1);
}

#[tokio::test]
async fn repeated_accept_by_owner_changes_nothing() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;

    f.service.accept(id, &user("agent-a")).await.unwrap();
    let again = f.service.accept(id, &user("agent-a")).await.unwrap();

    assert_eq!(again.status, LiveChatStatus::Active);
    assert_eq!(f.current(id).await.message_count, 3);
}

#[tokio::test]
async fn accept_requires_availability_and_membership() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;

    let unavailable = f.service.accept(id, &user("member-c")).await.unwrap_err();
    assert!(matches!(unavailable, LiveChatError::Forbidden(_)));

    f.team.add_agent(AgentProfile::new("outsider", "Olga")).await;
    let outsider = f.service.accept(id, &user("outsider")).await.unwrap_err();
    assert!(matches!(outsider, LiveChatError::Forbidden(_)));

    f.team.deactivate_member("org-1", "agent-b").await;
    let inactive = f.service.accept(id, &user("agent-b")).await.unwrap_err();
    assert!(matches!(inactive, LiveChatError::Forbidden(_)));

    assert_eq!(f.current(id).await.status(), LiveChatStatus::Requested);
}

#[tokio::test]
async fn accept_outside_requested_is_rejected() {
    let f = fixture().await;
    let id = f.seed(Conversation::new("widget-1")).await;

    let err = f.service.accept(id, &user("agent-a")).await.unwrap_err();
    assert!(matches!(err, LiveChatError::InvalidState(_)));

    let missing = f.service.accept(Uuid::new_v4(), &user("agent-a")).await.unwrap_err();
    assert!(matches!(missing, LiveChatError::NotFound(_)));
}

#[tokio::test]
async fn agent_message_requires_ownership() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;
    f.service.accept(id, &user("agent-a")).await.unwrap();

    let message = f
        .service
        .send_message(id, &user("agent-a"), "How can I help?")
        .await
        .unwrap();
    assert_eq!(message.role, MessageRole::Agent);
    assert_eq!(message.agent_info.unwrap().name, "Alice");

    let err = f
        .service
        .send_message(id, &user("agent-b"), "Me too")
        .await
        .unwrap_err();
    assert!(matches!(err, LiveChatError::Forbidden(_)));
    assert_eq!(f.current(id).await.message_count, 4);
}

#[tokio::test]
async fn user_message_only_while_active() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;

    let waiting = f.service.user_message(id, "hello?").await.unwrap_err();
    assert!(matches!(waiting, LiveChatError::InvalidState(_)));

    f.service.accept(id, &user("agent-a")).await.unwrap();
    let message = f.service.user_message(id, "My invoice is wrong").await.unwrap();
    assert_eq!(message.role, MessageRole::User);
    assert_eq!(f.current(id).await.messages.last().unwrap().id, message.id);

    f.service.end(id, &user("agent-a")).await.unwrap();
    let ended = f.service.user_message(id, "still there?").await.unwrap_err();
    assert!(matches!(ended, LiveChatError::InvalidState(_)));
}

#[tokio::test]
async fn blank_messages_are_rejected_before_any_read() {
    let f = fixture().await;
    let err = f.service.user_message(Uuid::new_v4(), "   ").await.unwrap_err();
    assert!(matches!(err, LiveChatError::Validation(_)));
}

#[tokio::test]
async fn plain_member_cannot_end_anothers_chat() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;
    f.service.accept(id, &user("agent-a")).await.unwrap();

    let err = f.service.end(id, &user("member-c")).await.unwrap_err();
    assert!(matches!(err, LiveChatError::Forbidden(_)));
    assert_eq!(f.current(id).await.status(), LiveChatStatus::Active);
}

#[tokio::test]
async fn accepting_agent_ends_chat() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;
    f.service.accept(id, &user("agent-a")).await.unwrap();

    let result = f.service.end(id, &user("agent-a")).await.unwrap();
    assert_eq!(result.status, LiveChatStatus::Ended);

    let conversation = f.current(id).await;
    assert!(conversation.live_chat.ended_at.is_some());
    assert_eq!(conversation.accepted_by(), Some("agent-a"));
    let closing = conversation.messages.last().unwrap();
    assert_eq!(closing.role, MessageRole::System);
    assert_eq!(closing.content, "The chat session has ended.");

    assert!(f.active_chats_of("agent-a").await.is_empty());
}

#[tokio::test]
async fn admin_may_end_but_agent_keeps_active_list() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;
    f.service.accept(id, &user("agent-a")).await.unwrap();

    f.service.end(id, &user("admin")).await.unwrap();
    assert_eq!(f.current(id).await.status(), LiveChatStatus::Ended);
    assert_eq!(f.active_chats_of("agent-a").await, vec![id]);
}

#[tokio::test]
async fn end_while_requested_is_invalid() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;

    let err = f.service.end(id, &user("admin")).await.unwrap_err();
    assert!(matches!(err, LiveChatError::InvalidState(_)));
    assert_eq!(f.current(id).await.message_count, 2);
}

#[tokio::test]
async fn outsiders_ending_a_waiting_chat_are_forbidden() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;

    for caller in ["member-c", "stranger"] {
        let err = f.service.end(id, &user(caller)).await.unwrap_err();
        assert!(matches!(err, LiveChatError::Forbidden(_)));
    }
    assert_eq!(f.current(id).await.status(), LiveChatStatus::Requested);
}

#[tokio::test]
async fn handoff_request_is_idempotent_and_one_way() {
    let f = fixture().await;
    let id = f.seed(Conversation::new("widget-1")).await;

    let first = f
        .service
        .request_handoff(id, Some("angry customer".to_string()))
        .await
        .unwrap();
    assert_eq!(first.status, LiveChatStatus::Requested);
    let requested_at = f.current(id).await.live_chat.requested_at;
    assert!(requested_at.is_some());

    f.service.request_handoff(id, None).await.unwrap();
    let conversation = f.current(id).await;
    assert_eq!(conversation.live_chat.requested_at, requested_at);
    assert_eq!(conversation.live_chat.handoff_reason.as_deref(), Some("angry customer"));

    f.service.accept(id, &user("agent-a")).await.unwrap();
    f.service.end(id, &user("agent-a")).await.unwrap();
    let err = f.service.request_handoff(id, None).await.unwrap_err();
    assert!(matches!(err, LiveChatError::InvalidState(_)));
}

#[tokio::test]
async fn poll_returns_messages_strictly_after_cursor() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;
    f.service.accept(id, &user("agent-a")).await.unwrap();

    let everything = f.service.poll(id, None).await.unwrap();
    assert_eq!(everything.new_messages.len(), 3);
    assert_eq!(everything.status, LiveChatStatus::Active);
    assert_eq!(everything.agent_info.unwrap().name, "Alice");

    let cursor = everything.last_message_id.clone().unwrap();
    let nothing_new = f.service.poll(id, Some(&cursor)).await.unwrap();
    assert!(nothing_new.new_messages.is_empty());
    assert_eq!(nothing_new.last_message_id.as_deref(), Some(cursor.as_str()));

    let reply = f.service.user_message(id, "thanks").await.unwrap();
    let after = f.service.poll(id, Some(&cursor)).await.unwrap();
    let ids: Vec<_> = after.new_messages.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![reply.id.clone()]);
    assert_eq!(after.last_message_id, Some(reply.id));

    let unknown = f.service.poll(id, Some("not-a-message")).await.unwrap();
    assert!(unknown.new_messages.is_empty());
}

#[tokio::test]
async fn queue_lists_requested_chats_of_callers_organizations() {
    let f = fixture().await;
    let newer = f.seed(requested("widget-1", 10)).await;
    let older = f.seed(requested("widget-1", 120)).await;
    f.seed(requested("widget-2", 500)).await;
    let active = f.seed(requested("widget-1", 300)).await;
    f.service.accept(active, &user("agent-b")).await.unwrap();

    let queue = f.service.queue(&user("agent-a")).await.unwrap();
    let ids: Vec<_> = queue.iter().map(|e| e.conversation_id).collect();
    assert_eq!(ids, vec![older, newer]);

    let first = &queue[0];
    assert_eq!(first.widget_name, "Support");
    assert_eq!(first.organization_name, "Acme");
    assert_eq!(first.handoff_reason.as_deref(), Some("billing"));
    assert_eq!(first.message_count, 2);
    assert_eq!(first.messages.len(), 2);
    assert!(first.wait_time_seconds >= 120);

    assert!(f.service.queue(&user("stranger")).await.unwrap().is_empty());
}

#[tokio::test]
async fn active_chats_follow_agent_profile() {
    let f = fixture().await;
    let first = f.seed(requested("widget-1", 60)).await;
    let second = f.seed(requested("widget-1", 30)).await;
    f.service.accept(first, &user("agent-a")).await.unwrap();
    f.service.accept(second, &user("agent-a")).await.unwrap();

    let chats = f.service.active_chats(&user("agent-a")).await.unwrap();
    let ids: Vec<_> = chats.iter().map(|c| c.conversation_id).collect();
    assert_eq!(ids, vec![first, second]);
    assert_eq!(chats[0].last_message.as_ref().unwrap().role, MessageRole::Agent);

    assert!(f.service.active_chats(&user("nobody")).await.unwrap().is_empty());
}

#[tokio::test]
async fn availability_is_written_through() {
    let f = fixture().await;
    let result = f.service.set_availability(&user("agent-a"), false).await.unwrap();
    assert!(!result.is_available);

    let id = f.seed(requested("widget-1", 30)).await;
    let err = f.service.accept(id, &user("agent-a")).await.unwrap_err();
    assert!(matches!(err, LiveChatError::Forbidden(_)));

    let missing = f.service.set_availability(&user("nobody"), true).await.unwrap_err();
    assert!(matches!(missing, LiveChatError::Upstream(_)));
}

#[tokio::test]
async fn viewers_see_accept_then_messages() {
    let f = fixture().await;
    let id = f.seed(requested("widget-1", 30)).await;
    let mut stream = f.hub.subscribe(id).await.unwrap();

    let frame = |bytes: Bytes| -> serde_json::Value {
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        serde_json::from_str(text.trim_start_matches("data: ").trim()).unwrap()
    };

    // snapshot: status + two existing messages
    for _ in 0..3 {
        stream.next().await.unwrap().unwrap();
    }

    f.service.accept(id, &user("agent-a")).await.unwrap();
    f.service.user_message(id, "hi").await.unwrap();

    let status = frame(stream.next().await.unwrap().unwrap());
    assert_eq!(status["type"], "status");
    assert_eq!(status["status"], "active");
    assert_eq!(status["agentInfo"]["name"], "Alice");

    let welcome = frame(stream.next().await.unwrap().unwrap());
    assert_eq!(welcome["message"]["type"], "agent");
    let user_message = frame(stream.next().await.unwrap().unwrap());
    assert_eq!(user_message["message"]["content"], "hi");
}
