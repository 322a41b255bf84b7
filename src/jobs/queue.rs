//! Bounded job queue between the webhook handler and the workers.
//!
//! The webhook must answer quickly, so events are only validated and queued
//! there. LINE redelivers events it believes were lost; the `seen` cache
//! drops an event whose `webhookEventId` was accepted recently.

use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use moka::future::Cache;

use crate::config::{WEBHOOK_EVENT_DEDUP_CAPACITY, WEBHOOK_EVENT_DEDUP_TTL_SECS};
use crate::services::line::{Event, Message};

/// Work derived from one webhook event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Text { user_id: String, text: String },
    Image { user_id: String, message_id: String },
    Audio { user_id: String, message_id: String },
    /// The user added the bot as a friend
    Follow { user_id: String },
}

impl Job {
    /// Job for an event, or `None` for events the assistant ignores
    pub fn from_event(event: &Event) -> Option<Job> {
        let user_id = event.user_id()?.to_string();
        match (event.kind.as_str(), &event.message) {
            ("message", Some(Message::Text { text, .. })) => Some(Job::Text {
                user_id,
                text: text.clone(),
            }),
            ("message", Some(Message::Image { id })) => Some(Job::Image {
                user_id,
                message_id: id.clone(),
            }),
            ("message", Some(Message::Audio { id, .. })) => Some(Job::Audio {
                user_id,
                message_id: id.clone(),
            }),
            ("follow", _) => Some(Job::Follow { user_id }),
            _ => None,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Job::Text { user_id, .. }
            | Job::Image { user_id, .. }
            | Job::Audio { user_id, .. }
            | Job::Follow { user_id } => user_id,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Text { .. } => "text",
            Job::Image { .. } => "image",
            Job::Audio { .. } => "audio",
            Job::Follow { .. } => "follow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("job queue is full")]
    Full,
    #[error("job queue is closed")]
    Closed,
}

#[derive(Clone)]
pub struct JobQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    seen: Cache<String, ()>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        let seen = Cache::builder()
            .max_capacity(WEBHOOK_EVENT_DEDUP_CAPACITY)
            .time_to_live(Duration::from_secs(WEBHOOK_EVENT_DEDUP_TTL_SECS))
            .build();
        Self { tx, rx, seen }
    }

    /// Queue a job without waiting.
    ///
    /// Returns `Ok(false)` when an event with the same ID was already
    /// accepted. A rejected job does not mark its event as seen, so a later
    /// redelivery can still get through.
    pub async fn submit(&self, event_id: Option<&str>, job: Job) -> Result<bool, QueueError> {
        if let Some(id) = event_id {
            let entry = self.seen.entry(id.to_string()).or_insert(()).await;
            if !entry.is_fresh() {
                tracing::debug!(event_id = id, "Dropping duplicate webhook event");
                return Ok(false);
            }
        }

        match self.tx.try_send(job) {
            Ok(()) => Ok(true),
            Err(e) => {
                if let Some(id) = event_id {
                    self.seen.invalidate(id).await;
                }
                match e {
                    TrySendError::Full(_) => Err(QueueError::Full),
                    TrySendError::Closed(_) => Err(QueueError::Closed),
                }
            }
        }
    }

    pub fn receiver(&self) -> Receiver<Job> {
        self.rx.clone()
    }

    /// Jobs waiting for a worker
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Stop accepting jobs; workers finish what is queued and exit.
    pub fn close(&self) {
        self.tx.close();
    }
}
