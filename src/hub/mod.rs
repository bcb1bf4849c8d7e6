//! Connection registry and broadcast hub.
//!
//! The hub is created once per server and injected into handlers. It keeps
//! the open live connections of every conversation, fans events out to them
//! and removes a connection as soon as its viewer is gone. Every connection
//! is served by one task (see [`connection`]), which owns the cursor and is
//! the only writer to the viewer.

pub mod bridge;
mod connection;
pub mod events;

pub use bridge::{Bridge, BridgeEnvelope, BridgeError, RedisBridge};
pub use connection::ConnectionId;
pub use events::{heartbeat_frame, HubEvent};

use crate::configuration::HubSettings;
use crate::db::{ConversationStore, StoreError};
use actix_web::web::Bytes;
use connection::{ConnectionTask, Cursor};
use futures::Stream;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("conversation {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one broadcast on this instance.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Queue full; the event was dropped and the connection will resync.
    pub lagging: Vec<ConnectionId>,
    /// Viewer gone; these connections have been deregistered.
    pub failed: Vec<ConnectionId>,
}

struct Registration {
    inbox: mpsc::Sender<HubEvent>,
    resync: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

type Registry = HashMap<Uuid, HashMap<ConnectionId, Registration>>;

pub struct Hub {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    store: Arc<dyn ConversationStore>,
    settings: HubSettings,
    bridge: Option<Arc<dyn Bridge>>,
    instance_id: Uuid,
    live_tasks: Arc<AtomicUsize>,
    opened: AtomicU64,
}

impl Hub {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        settings: HubSettings,
        bridge: Option<Arc<dyn Bridge>>,
    ) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            store,
            settings,
            bridge,
            instance_id: Uuid::new_v4(),
            live_tasks: Arc::new(AtomicUsize::new(0)),
            opened: AtomicU64::new(0),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // A panic while holding the lock cannot leave a half-written map
        // entry, so a poisoned registry is still usable.
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a live connection. The returned stream starts with the current
    /// status and the last `backlog_size` messages, then carries live
    /// events until it is dropped.
    #[tracing::instrument(name = "Hub subscribe", skip(self))]
    pub async fn subscribe(self: &Arc<Self>, conversation_id: Uuid) -> Result<ConnectionStream, HubError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (inbox_tx, inbox_rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let resync = Arc::new(AtomicBool::new(false));

        // Registered before the snapshot read, so nothing committed after
        // the read can be missed. Events already covered by the snapshot
        // are skipped by the cursor.
        self.registry().entry(conversation_id).or_default().insert(
            id,
            Registration {
                inbox: inbox_tx,
                resync: resync.clone(),
                task: None,
            },
        );

        let conversation = match self.store.fetch(conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                self.unsubscribe(conversation_id, id);
                return Err(HubError::NotFound(conversation_id));
            }
            Err(err) => {
                self.unsubscribe(conversation_id, id);
                return Err(err.into());
            }
        };

        let mut snapshot = VecDeque::with_capacity(self.settings.backlog_size + 1);
        snapshot.push_back(HubEvent::status_of(&conversation).to_frame());
        let backlog_start = conversation
            .messages
            .len()
            .saturating_sub(self.settings.backlog_size);
        for position in backlog_start..conversation.messages.len() {
            snapshot.push_back(HubEvent::message_at(&conversation, position).to_frame());
        }

        let (out_tx, out_rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let task = ConnectionTask {
            id,
            conversation_id,
            cursor: Cursor::at_end_of(&conversation),
            inbox: inbox_rx,
            resync,
            out: out_tx,
            store: self.store.clone(),
            poll_interval: match self.settings.poll_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            heartbeat_interval: Duration::from_secs(self.settings.heartbeat_interval_secs.max(1)),
            hub: Arc::downgrade(self),
        };
        let handle = tokio::spawn(task.run(self.live_tasks.clone())).abort_handle();

        let still_registered = match self
            .registry()
            .get_mut(&conversation_id)
            .and_then(|connections| connections.get_mut(&id))
        {
            Some(registration) => {
                registration.task = Some(handle.clone());
                true
            }
            None => false,
        };
        if !still_registered {
            handle.abort();
        }

        self.opened.fetch_add(1, Ordering::Relaxed);
        tracing::info!(connection = id, "Live chat connection opened");

        Ok(ConnectionStream {
            snapshot,
            frames: ReceiverStream::new(out_rx),
            _handle: ConnectionHandle {
                hub: Arc::downgrade(self),
                conversation_id,
                id,
            },
        })
    }

    /// Removes a connection and stops its task. Returns false when it was
    /// already gone.
    pub fn unsubscribe(&self, conversation_id: Uuid, id: ConnectionId) -> bool {
        let removed = {
            let mut registry = self.registry();
            let removed = registry
                .get_mut(&conversation_id)
                .and_then(|connections| connections.remove(&id));
            if registry
                .get(&conversation_id)
                .map_or(false, |connections| connections.is_empty())
            {
                registry.remove(&conversation_id);
            }
            removed
        };

        match removed {
            Some(registration) => {
                if let Some(task) = registration.task {
                    task.abort();
                }
                tracing::debug!(connection = id, conversation_id = %conversation_id, "Live chat connection removed");
                true
            }
            None => false,
        }
    }

    /// Hands `event` to every local connection of the conversation without
    /// waiting on any of them.
    pub fn dispatch(&self, conversation_id: Uuid, event: &HubEvent) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        {
            let mut registry = self.registry();
            let Some(connections) = registry.get_mut(&conversation_id) else {
                return report;
            };

            for (id, registration) in connections.iter() {
                match registration.inbox.try_send(event.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        registration.resync.store(true, Ordering::SeqCst);
                        report.lagging.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => report.failed.push(*id),
                }
            }

            for id in &report.failed {
                if let Some(registration) = connections.remove(id) {
                    dead.extend(registration.task);
                }
            }
            if connections.is_empty() {
                registry.remove(&conversation_id);
            }
        }

        for task in dead {
            task.abort();
        }
        report
    }

    /// Local dispatch plus, when configured, publication to the other
    /// instances. Never fails and never waits on the bridge; problems are
    /// logged.
    pub fn broadcast(&self, conversation_id: Uuid, event: HubEvent) -> BroadcastReport {
        let report = self.dispatch(conversation_id, &event);

        if !report.failed.is_empty() || !report.lagging.is_empty() {
            tracing::warn!(
                conversation_id = %conversation_id,
                failed = ?report.failed,
                lagging = ?report.lagging,
                "Broadcast did not reach every connection"
            );
        }

        if let Some(bridge) = self.bridge.clone() {
            let envelope = BridgeEnvelope {
                origin: self.instance_id,
                conversation_id,
                event,
            };
            tokio::spawn(async move {
                if let Err(err) = bridge.publish(&envelope).await {
                    tracing::warn!(conversation_id = %conversation_id, "Bridge publish failed: {}", err);
                }
            });
        }

        report
    }

    /// Entry point for events published by other instances.
    pub fn accept_remote(&self, envelope: BridgeEnvelope) -> Option<BroadcastReport> {
        if envelope.origin == self.instance_id {
            return None;
        }
        Some(self.dispatch(envelope.conversation_id, &envelope.event))
    }

    pub fn connection_count(&self) -> usize {
        self.registry().values().map(HashMap::len).sum()
    }

    pub fn connections_for(&self, conversation_id: Uuid) -> usize {
        self.registry().get(&conversation_id).map_or(0, HashMap::len)
    }

    pub fn conversation_count(&self) -> usize {
        self.registry().len()
    }

    /// Connection tasks that have not finished yet.
    pub fn live_tasks(&self) -> usize {
        self.live_tasks.load(Ordering::SeqCst)
    }

    pub fn total_opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }
}

/// Deregisters its connection when dropped.
pub struct ConnectionHandle {
    hub: Weak<Hub>,
    conversation_id: Uuid,
    id: ConnectionId,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.conversation_id, self.id);
        }
    }
}

/// SSE body of one live connection.
pub struct ConnectionStream {
    snapshot: VecDeque<Bytes>,
    frames: ReceiverStream<Bytes>,
    _handle: ConnectionHandle,
}

impl ConnectionStream {
    pub fn handle(&self) -> &ConnectionHandle {
        &self._handle
    }
}

impl Stream for ConnectionStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(frame) = this.snapshot.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }
        Pin::new(&mut this.frames)
            .poll_next(cx)
            .map(|frame| frame.map(Ok))
    }
}
