//! Callback lists with removable registrations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Handle returned when a callback is registered; pass it back to unregister.
pub type ListenerId = u64;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Registered callbacks, invoked from a snapshot so none runs under the list lock.
pub(crate) struct ListenerList<T> {
    entries: Mutex<Vec<(ListenerId, T)>>,
}

impl<T> Default for ListenerList<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }
}

impl<T: Clone> ListenerList<T> {
    pub fn add(&self, callback: T) -> ListenerId {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).push((id, callback));
        id
    }

    /// `false` if `id` was not (or no longer) registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_only_drops_the_matching_entry() {
        let list = ListenerList::default();
        let a = list.add("a");
        let b = list.add("b");
        assert_ne!(a, b);
        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.snapshot(), vec!["b"]);
        assert_eq!(list.len(), 1);
    }
}
