//! Cross-instance fan-out over Redis pub/sub.
//!
//! Every instance publishes its broadcasts to `{prefix}:{conversation_id}`
//! and listens on `{prefix}:*`. Events carry the publishing instance id so a
//! listener can drop its own echoes.

use super::{Hub, HubEvent};
use crate::configuration::BridgeSettings;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    pub origin: Uuid,
    pub conversation_id: Uuid,
    pub event: HubEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("envelope encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait Bridge: Send + Sync {
    async fn publish(&self, envelope: &BridgeEnvelope) -> Result<(), BridgeError>;
}

pub struct RedisBridge {
    client: redis::Client,
    prefix: String,
    publisher: OnceCell<ConnectionManager>,
}

impl RedisBridge {
    pub fn new(settings: &BridgeSettings) -> Result<Self, BridgeError> {
        let client = redis::Client::open(settings.redis_url.as_str())?;
        Ok(Self {
            client,
            prefix: settings.channel_prefix.clone(),
            publisher: OnceCell::new(),
        })
    }

    fn channel(&self, conversation_id: Uuid) -> String {
        format!("{}:{}", self.prefix, conversation_id)
    }

    async fn publisher(&self) -> Result<ConnectionManager, BridgeError> {
        let connection = self
            .publisher
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(connection.clone())
    }

    /// Forwards remote events into `hub` until the hub is dropped.
    /// Reconnects with a capped backoff when the subscription breaks.
    pub fn spawn_listener(&self, hub: &Arc<Hub>) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let pattern = format!("{}:*", self.prefix);
        let hub = Arc::downgrade(hub);

        tokio::spawn(async move {
            let mut backoff = Duration::from_millis(500);
            loop {
                match listen(&client, &pattern, &hub).await {
                    Ok(()) => return,
                    Err(err) => {
                        tracing::warn!("Bridge subscription lost: {}, retrying in {:?}", err, backoff);
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_secs(30));
                    }
                }
                if hub.strong_count() == 0 {
                    return;
                }
            }
        })
    }
}

/// Returns Ok when the hub is gone.
async fn listen(client: &redis::Client, pattern: &str, hub: &Weak<Hub>) -> Result<(), BridgeError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(pattern).await?;
    tracing::info!(pattern = pattern, "Bridge listener subscribed");

    let mut messages = pubsub.on_message();
    while let Some(message) = messages.next().await {
        let Some(hub) = hub.upgrade() else {
            return Ok(());
        };

        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("Unreadable bridge payload: {}", err);
                continue;
            }
        };
        match serde_json::from_str::<BridgeEnvelope>(&payload) {
            Ok(envelope) => {
                hub.accept_remote(envelope);
            }
            Err(err) => tracing::warn!("Malformed bridge envelope: {}", err),
        }
    }

    Err(BridgeError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "pub/sub stream closed",
    ))))
}

#[async_trait::async_trait]
impl Bridge for RedisBridge {
    async fn publish(&self, envelope: &BridgeEnvelope) -> Result<(), BridgeError> {
        let payload = serde_json::to_string(envelope)?;
        let mut connection = self.publisher().await?;
        let (): () = connection
            .publish(self.channel(envelope.conversation_id), payload)
            .await?;
        Ok(())
    }
}
