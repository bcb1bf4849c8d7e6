use super::events::{heartbeat_frame, HubEvent};
use super::Hub;
use crate::db::ConversationStore;
use crate::models::{Conversation, LiveChatStatus};
use actix_web::web::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

pub type ConnectionId = u64;

/// What a connection has already been sent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cursor {
    /// Number of messages of the conversation covered so far. Only grows.
    delivered: usize,
    last_message_id: Option<String>,
    last_status: Option<LiveChatStatus>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Placement {
    Duplicate,
    Next,
    /// Something between the cursor and this message was never seen.
    Gap,
}

impl Cursor {
    /// A new subscriber is considered to have seen everything up to now.
    pub(crate) fn at_end_of(conversation: &Conversation) -> Self {
        Self {
            delivered: conversation.messages.len(),
            last_message_id: conversation.last_message_id().map(str::to_string),
            last_status: Some(conversation.status()),
        }
    }

    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }

    pub(crate) fn last_message_id(&self) -> Option<&str> {
        self.last_message_id.as_deref()
    }

    pub(crate) fn place(&self, position: usize) -> Placement {
        if position < self.delivered {
            Placement::Duplicate
        } else if position == self.delivered {
            Placement::Next
        } else {
            Placement::Gap
        }
    }

    pub(crate) fn advance(&mut self, message_id: &str) {
        self.delivered += 1;
        self.last_message_id = Some(message_id.to_string());
    }

    /// Returns true when `status` is ahead of what was last sent. Repeated
    /// and stale statuses are dropped.
    pub(crate) fn observe_status(&mut self, status: LiveChatStatus) -> bool {
        if Some(status) <= self.last_status {
            return false;
        }
        self.last_status = Some(status);
        true
    }
}

/// The viewer went away; the task must stop.
#[derive(Debug)]
pub(crate) struct Disconnected;

/// Decrements the hub's live-task counter however the task ends,
/// including abort.
struct TaskGuard(Arc<AtomicUsize>);

impl TaskGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-connection worker: drains hub events, re-checks the store on a
/// timer and sends heartbeats while idle. Owns the cursor, so every frame
/// for a connection goes through one place.
pub(crate) struct ConnectionTask {
    pub(crate) id: ConnectionId,
    pub(crate) conversation_id: Uuid,
    pub(crate) cursor: Cursor,
    pub(crate) inbox: mpsc::Receiver<HubEvent>,
    pub(crate) resync: Arc<AtomicBool>,
    pub(crate) out: mpsc::Sender<Bytes>,
    pub(crate) store: Arc<dyn ConversationStore>,
    pub(crate) poll_interval: Option<Duration>,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) hub: Weak<Hub>,
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn interval_from_now(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl ConnectionTask {
    pub(crate) async fn run(mut self, live_tasks: Arc<AtomicUsize>) {
        let _guard = TaskGuard::new(live_tasks);
        let mut heartbeat = interval_from_now(self.heartbeat_interval);
        let mut poll = self.poll_interval.map(interval_from_now);

        loop {
            if self.resync.swap(false, Ordering::SeqCst) && self.resync_from_store().await.is_err()
            {
                break;
            }

            let outcome = tokio::select! {
                event = self.inbox.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => Err(Disconnected),
                },
                _ = heartbeat.tick() => self.out.send(heartbeat_frame()).await.map(|()| 0).map_err(|_| Disconnected),
                _ = next_tick(&mut poll) => self.resync_from_store().await,
            };

            match outcome {
                Ok(wrote) if wrote > 0 => heartbeat.reset(),
                Ok(_) => {}
                Err(Disconnected) => break,
            }
        }

        tracing::debug!(
            connection = self.id,
            conversation_id = %self.conversation_id,
            delivered = self.cursor.delivered(),
            "Live chat connection closed"
        );

        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.conversation_id, self.id);
        }
    }

    /// Returns the number of frames written.
    async fn handle(&mut self, event: HubEvent) -> Result<usize, Disconnected> {
        match event {
            HubEvent::Status { status, .. } => {
                if self.cursor.observe_status(status) {
                    self.write(&event).await?;
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            HubEvent::Message {
                position,
                ref message,
            } => match self.cursor.place(position) {
                Placement::Duplicate => Ok(0),
                Placement::Next => {
                    let message_id = message.id.clone();
                    self.write(&event).await?;
                    self.cursor.advance(&message_id);
                    Ok(1)
                }
                Placement::Gap => self.resync_from_store().await,
            },
        }
    }

    /// Brings the viewer up to date with the stored document. A failed read
    /// keeps the connection; the next tick or event tries again.
    async fn resync_from_store(&mut self) -> Result<usize, Disconnected> {
        let conversation = match self.store.fetch(self.conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return Ok(0),
            Err(err) => {
                tracing::warn!(
                    conversation_id = %self.conversation_id,
                    "Live chat resync failed: {}",
                    err
                );
                return Ok(0);
            }
        };

        let mut written = 0;
        if self.cursor.observe_status(conversation.status()) {
            self.write(&HubEvent::status_of(&conversation)).await?;
            written += 1;
        }

        for position in self.cursor.delivered()..conversation.messages.len() {
            let event = HubEvent::message_at(&conversation, position);
            self.write(&event).await?;
            self.cursor.advance(&conversation.messages[position].id);
            written += 1;
        }

        Ok(written)
    }

    async fn write(&self, event: &HubEvent) -> Result<(), Disconnected> {
        self.out
            .send(event.to_frame())
            .await
            .map_err(|_| Disconnected)
    }
}
