use crate::rate_limit::SlidingWindow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Storage for per-key sliding windows.
///
/// Implementations must run each closure with exclusive access to that key's window, so
/// prune, count and push happen as one step. Different keys must not block each other for
/// longer than a map lookup.
pub trait WindowStore: Send + Sync + std::fmt::Debug {
    /// Run `f` on the window for `key`, creating an empty one if needed.
    fn with_window(&self, key: &str, f: &mut dyn FnMut(&mut SlidingWindow));

    /// Run `f` on the window for `key` if it exists. Returns whether it did.
    ///
    /// A window that `f` leaves empty is dropped unless another caller is using it.
    fn with_existing(&self, key: &str, f: &mut dyn FnMut(&mut SlidingWindow)) -> bool;

    /// Drop the window for `key`.
    fn remove(&self, key: &str) -> bool;

    /// Keys currently holding a window, sorted.
    fn keys(&self) -> Vec<String>;
}

/// In-process window store with one mutex per key.
#[derive(Default, Clone, Debug)]
pub struct InMemoryWindowStore {
    windows: Arc<RwLock<HashMap<String, Arc<Mutex<SlidingWindow>>>>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Option<Arc<Mutex<SlidingWindow>>> {
        self.windows.read().unwrap_or_else(|p| p.into_inner()).get(key).cloned()
    }

    fn slot_or_insert(&self, key: &str) -> Arc<Mutex<SlidingWindow>> {
        if let Some(slot) = self.slot(key) {
            return slot;
        }
        let mut map = self.windows.write().unwrap_or_else(|p| p.into_inner());
        map.entry(key.to_string()).or_default().clone()
    }

    fn remove_if_idle(&self, key: &str, slot: &Arc<Mutex<SlidingWindow>>) {
        let mut map = self.windows.write().unwrap_or_else(|p| p.into_inner());
        // Handles are only cloned under the map lock, so the count cannot grow while we hold it.
        let idle = match map.get(key) {
            Some(current) => {
                Arc::ptr_eq(current, slot)
                    && Arc::strong_count(slot) == 2
                    && slot.lock().unwrap_or_else(|p| p.into_inner()).is_empty()
            }
            None => false,
        };
        if idle {
            map.remove(key);
        }
    }
}

/// Returns whether `f` left the window empty.
fn run(slot: &Mutex<SlidingWindow>, f: &mut dyn FnMut(&mut SlidingWindow)) -> bool {
    // A panic inside another check cannot leave the deque half-written.
    let mut window = slot.lock().unwrap_or_else(|p| p.into_inner());
    f(&mut *window);
    window.is_empty()
}

impl WindowStore for InMemoryWindowStore {
    fn with_window(&self, key: &str, f: &mut dyn FnMut(&mut SlidingWindow)) {
        run(&self.slot_or_insert(key), f);
    }

    fn with_existing(&self, key: &str, f: &mut dyn FnMut(&mut SlidingWindow)) -> bool {
        let Some(slot) = self.slot(key) else {
            return false;
        };
        if run(&slot, f) {
            self.remove_if_idle(key, &slot);
        }
        true
    }

    fn remove(&self, key: &str) -> bool {
        self.windows.write().unwrap_or_else(|p| p.into_inner()).remove(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        let map = self.windows.read().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_existing_does_not_create() {
        let store = InMemoryWindowStore::new();
        assert!(!store.with_existing("api:alice", &mut |_| {}));
        assert!(store.keys().is_empty());

        store.with_window("api:alice", &mut |w: &mut SlidingWindow| {
            w.try_admit(10, 1_000, 5);
        });
        let mut len = 0;
        assert!(store.with_existing("api:alice", &mut |w: &mut SlidingWindow| len = w.len()));
        assert_eq!(len, 1);
        assert_eq!(store.keys(), vec!["api:alice".to_string()]);

        assert!(store.remove("api:alice"));
        assert!(!store.remove("api:alice"));
    }

    #[test]
    fn emptied_window_is_dropped() {
        let store = InMemoryWindowStore::new();
        store.with_window("api:alice", &mut |w: &mut SlidingWindow| {
            w.try_admit(0, 1_000, 5);
        });
        let prune_at = |now: u64| move |w: &mut SlidingWindow| w.prune(now, 1_000);
        assert!(store.with_existing("api:alice", &mut prune_at(500)));
        assert_eq!(store.keys(), vec!["api:alice".to_string()]);

        assert!(store.with_existing("api:alice", &mut prune_at(1_001)));
        assert!(store.keys().is_empty());
        assert!(!store.with_existing("api:alice", &mut |_| {}));
    }

    #[test]
    fn window_in_use_is_not_dropped() {
        let store = InMemoryWindowStore::new();
        store.with_window("api:bob", &mut |_| {});
        let held = store.slot("api:bob").unwrap();
        assert!(store.with_existing("api:bob", &mut |_| {}));
        assert_eq!(store.keys(), vec!["api:bob".to_string()]);

        drop(held);
        assert!(store.with_existing("api:bob", &mut |_| {}));
        assert!(store.keys().is_empty());
    }

    #[test]
    fn concurrent_admissions_respect_limit() {
        let store = InMemoryWindowStore::new();
        let admitted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.with_window("ai:bob", &mut |w: &mut SlidingWindow| {
                            if w.try_admit(0, 60_000, 20) {
                                admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            }
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(admitted.load(std::sync::atomic::Ordering::SeqCst), 20);
    }
}
