//! Capability-change listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::protocol::{EventKind, ProviderEvent};

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

/// Listeners keyed by event kind. Listeners run outside the lock, so they may
/// register or remove listeners themselves.
#[derive(Default)]
pub struct EventEmitter {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: EventKind, listener: impl Fn(&ProviderEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().entry(kind).or_default().push((id, Arc::new(listener)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        for entries in listeners.values_mut() {
            if let Some(index) = entries.iter().position(|(l, _)| *l == id) {
                entries.remove(index);
                return true;
            }
        }
        false
    }

    pub fn emit(&self, event: &ProviderEvent) {
        let listeners: Vec<Listener> = self
            .lock()
            .get(&event.kind())
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<(ListenerId, Listener)>>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<EventKind, usize> = self.lock().iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventEmitter").field("listeners", &counts).finish()
    }
}
