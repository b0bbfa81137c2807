//! Process-wide session state with an explicit lifecycle.
//!
//! The session is not an ambient singleton: it lives in a watch channel so
//! the guard (and any UI) reacts to transitions, and every transition bumps
//! an epoch. Async continuations capture the epoch before a network round
//! trip and compare after: a response that crosses a session boundary is
//! stale and must be discarded, never applied.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::models::Session;

pub struct SessionStore {
    current: watch::Sender<Option<Session>>,
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            epoch: AtomicU64::new(0),
        }
    }

    /// Install or clear the session. Either direction invalidates all
    /// in-flight continuations by bumping the epoch.
    pub fn set(&self, session: Option<Session>) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.current.send_replace(session);
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// The liveness token for async continuations.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Subscribe to session transitions.
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
