use actix_web::{get, App, HttpRequest, HttpResponse, HttpServer};
use livechat::configuration::{
    BridgeSettings, DatabaseSettings, HubSettings, LiveChatSettings, Settings,
};
use livechat::connectors::{ConnectorConfig, InMemoryTeamService};
use livechat::db::MemoryConversationStore;
use livechat::forms::user::{UserForm, UserProfile};
use livechat::models::{AgentProfile, Conversation, LiveChatStatus, MemberRole, Message};
use std::net::TcpListener;
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryConversationStore>,
    pub team: Arc<InMemoryTeamService>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn seed_requested(&self) -> uuid::Uuid {
        let mut conversation = Conversation::new("widget-1");
        conversation.push_message(Message::user("Can I talk to a person?"));
        conversation.live_chat.status = LiveChatStatus::Requested;
        conversation.live_chat.requested_at = Some(chrono::Utc::now());
        let id = conversation.id;
        self.store.insert(conversation).await;
        id
    }

    pub async fn post_as(&self, token: &str, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

/// Bearer tokens are `token-<user id>`; anything else is rejected.
#[get("/me")]
async fn mock_auth(req: HttpRequest) -> HttpResponse {
    let token = req
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer token-"))
        .map(str::to_string);

    match token {
        Some(user_id) => HttpResponse::Ok().json(UserForm {
            user: UserProfile {
                id: user_id.clone(),
                first_name: user_id,
                email_confirmed: true,
                ..Default::default()
            },
        }),
        None => HttpResponse::Unauthorized().finish(),
    }
}

fn spawn_mock_auth() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind auth port");
    let port = listener.local_addr().unwrap().port();
    let server = HttpServer::new(|| App::new().service(mock_auth))
        .listen(listener)
        .unwrap()
        .run();
    let _ = tokio::spawn(server);
    format!("http://127.0.0.1:{}/me", port)
}

pub fn test_settings(auth_url: String) -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5432,
            database_name: "livechat".to_string(),
        },
        app_port: 0,
        app_host: "127.0.0.1".to_string(),
        auth_url,
        hub: HubSettings {
            poll_interval_secs: 0,
            heartbeat_interval_secs: 30,
            backlog_size: 10,
            channel_capacity: 64,
        },
        live_chat: LiveChatSettings::default(),
        connectors: ConnectorConfig::default(),
        bridge: BridgeSettings::default(),
    }
}

async fn seed_directory(team: &InMemoryTeamService) {
    team.add_organization("org-1", "Acme").await;
    team.add_widget("widget-1", "Support", "org-1").await;
    team.add_member("org-1", "agent-a", MemberRole::Member).await;
    team.add_member("org-1", "agent-b", MemberRole::Member).await;
    team.add_member("org-1", "member-c", MemberRole::Member).await;
    team.add_member("org-1", "owner", MemberRole::Owner).await;
    team.add_agent(AgentProfile::new("agent-a", "Alice")).await;
    team.add_agent(AgentProfile::new("agent-b", "Bob")).await;
}

pub async fn spawn_app() -> TestApp {
    let auth_url = spawn_mock_auth();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let store = Arc::new(MemoryConversationStore::new());
    let team = Arc::new(InMemoryTeamService::new());
    seed_directory(&team).await;

    let server = livechat::startup::run(
        listener,
        test_settings(auth_url),
        store.clone(),
        team.clone(),
    )
    .await
    .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        store,
        team,
        client: reqwest::Client::new(),
    }
}
