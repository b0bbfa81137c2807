//! Transient user-visible notices (failed mutations, degraded connection).
//!
//! A broadcast stream a UI layer renders as toasts; nothing here blocks or
//! persists. Dropping every receiver just means nobody is looking.

use synapse_common::id::{prefix, prefixed_ulid};
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct Notice {
    pub id: String,
    pub message: String,
}

#[derive(Clone)]
pub struct NoticeFeed {
    sender: broadcast::Sender<Notice>,
}

impl NoticeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn publish(&self, message: impl Into<String>) {
        let notice = Notice {
            id: prefixed_ulid(prefix::NOTICE),
            message: message.into(),
        };
        let _ = self.sender.send(notice);
    }
}

impl Default for NoticeFeed {
    fn default() -> Self {
        Self::new()
    }
}
