//! Per-sender busy tracking.
//!
//! One entry per sender identity, created lazily and never removed. An entry is
//! busy while an assistant invocation for that sender is in flight; the flag is
//! cleared by dropping the [`BusyGuard`] returned from [`SessionTracker::try_acquire`].

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Sender identity (normalized address).
pub type SenderId = String;

/// Session state for one sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub busy: bool,
    /// When the in-flight invocation started; None while idle.
    pub busy_since: Option<DateTime<Utc>>,
}

/// Shared map of sender identity to session state.
///
/// A std mutex rather than tokio's: the lock is never held across an await and
/// must be taken from `Drop`.
#[derive(Clone, Default)]
pub struct SessionTracker {
    inner: Arc<Mutex<HashMap<SenderId, SessionState>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SenderId, SessionState>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state for a sender; idle default when the sender has never been seen.
    pub fn state(&self, sender: &str) -> SessionState {
        self.lock().get(sender).cloned().unwrap_or_default()
    }

    pub fn is_busy(&self, sender: &str) -> bool {
        self.state(sender).busy
    }

    /// Mark the sender busy if idle. Returns None when an invocation is already in flight.
    pub fn try_acquire(&self, sender: &str) -> Option<BusyGuard> {
        let mut map = self.lock();
        let entry = map.entry(sender.to_string()).or_default();
        if entry.busy {
            return None;
        }
        entry.busy = true;
        entry.busy_since = Some(Utc::now());
        Some(BusyGuard {
            tracker: self.clone(),
            sender: sender.to_string(),
        })
    }

    fn release(&self, sender: &str) {
        if let Some(entry) = self.lock().get_mut(sender) {
            entry.busy = false;
            entry.busy_since = None;
        }
    }

    /// Number of senders seen so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a sender's busy flag; clears it on drop.
#[must_use = "dropping the guard immediately marks the sender idle"]
pub struct BusyGuard {
    tracker: SessionTracker,
    sender: SenderId,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.tracker.release(&self.sender);
    }
}
