//! Event name → listeners.
//!
//! Each registration gets its own [`ListenerId`], so the same closure can be
//! registered twice and removed independently.  Dispatch works on a
//! snapshot of the listener list, which lets a callback subscribe or
//! unsubscribe (itself included) without deadlocking or skipping anyone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    event: String,
    id: ListenerId,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Callback)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        Subscription {
            event: event.to_string(),
            id,
        }
    }

    /// Remove a registration.  Returns whether it was still registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut map = self.lock();
        let Some(list) = map.get_mut(&subscription.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(&subscription.event);
        }
        removed
    }

    /// Invoke every listener of `event` once.  Returns how many ran.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        // Snapshot so callbacks run without the lock held.
        let snapshot: Vec<Callback> = match self.lock().get(event) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };
        for callback in &snapshot {
            callback(payload);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(ListenerId, Callback)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
