//! Local mirror of the server's notification list and its unread counter.
//!
//! The list is fed from two directions: bulk pulls (cold start, reconnect)
//! and push events, which are not ordered relative to each other. Merging is
//! therefore idempotent by record ID. The unread counter is derived state;
//! every path that touches a record's read flag or the list itself updates
//! the counter inside the same critical section, so readers can never
//! observe the two out of sync.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::SyncError;
use crate::models::NotificationRecord;

/// Attempts for the mark-all-read backend call before rolling back.
const MARK_READ_ATTEMPTS: u32 = 3;
const MARK_READ_RETRY_DELAY: Duration = Duration::from_millis(250);

/// The one backend mutation the mirror issues itself.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn mark_all_read(&self) -> Result<(), SyncError>;
}

struct MirrorState {
    /// Newest-first.
    records: Vec<NotificationRecord>,
    /// Always equals the number of records with `read == false`.
    unread: usize,
}

pub struct NotificationMirror {
    inner: Mutex<MirrorState>,
}

impl NotificationMirror {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MirrorState {
                records: Vec::new(),
                unread: 0,
            }),
        }
    }

    /// Replace the local list with an authoritative snapshot. Used on cold
    /// start and after every reconnect.
    pub fn replace_all(&self, mut records: Vec<NotificationRecord>) {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let unread = records.iter().filter(|r| !r.read).count();
        let mut state = self.inner.lock();
        state.records = records;
        state.unread = unread;
    }

    /// Merge a pushed record. A push postdates any pulled snapshot, so it
    /// goes to the head. If the same ID is already present, the push lost a
    /// race against a pull that covered it and is dropped. Returns whether
    /// the record was inserted.
    pub fn on_push(&self, record: NotificationRecord) -> bool {
        let mut state = self.inner.lock();
        if state.records.iter().any(|r| r.id == record.id) {
            tracing::debug!(id = %record.id, "duplicate notification push dropped");
            return false;
        }
        if !record.read {
            state.unread += 1;
        }
        state.records.insert(0, record);
        true
    }

    /// Count of unread records.
    pub fn unread(&self) -> usize {
        self.inner.lock().unread
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Snapshot of the list, newest-first.
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.inner.lock().records.clone()
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.records.clear();
        state.unread = 0;
    }

    /// Mark every record read locally, then tell the backend. Optimistic:
    /// the badge clears the moment the user acts. If the backend call
    /// fails persistently (retry budget exhausted), the flags flipped here
    /// are restored; records that arrived meanwhile keep their own state.
    pub async fn mark_all_read(&self, backend: &dyn NotificationBackend) -> Result<(), SyncError> {
        let flipped: Vec<String> = {
            let mut state = self.inner.lock();
            let ids: Vec<String> = state
                .records
                .iter()
                .filter(|r| !r.read)
                .map(|r| r.id.clone())
                .collect();
            for record in state.records.iter_mut() {
                record.read = true;
            }
            state.unread = 0;
            ids
        };

        if flipped.is_empty() {
            return Ok(());
        }

        let mut attempt = 1;
        loop {
            match backend.mark_all_read().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MARK_READ_ATTEMPTS && e.is_retryable() => {
                    tracing::debug!(attempt, error = %e, "mark-all-read failed; retrying");
                    attempt += 1;
                    tokio::time::sleep(MARK_READ_RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "mark-all-read failed; rolling back");
                    let mut state = self.inner.lock();
                    for record in state.records.iter_mut() {
                        if flipped.iter().any(|id| *id == record.id) {
                            record.read = false;
                        }
                    }
                    state.unread = state.records.iter().filter(|r| !r.read).count();
                    return Err(e);
                }
            }
        }
    }
}

impl Default for NotificationMirror {
    fn default() -> Self {
        Self::new()
    }
}
