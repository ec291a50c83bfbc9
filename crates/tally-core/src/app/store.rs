//! StateStore - アプリ状態の正本と購読者への通知
//!
//! # 設計
//! - グローバルなシングルトンではなく、engine が所有するコンテキストオブジェクト
//! - 変更のたびに完全なスナップショットを全購読者へ渡す
//! - 通知はロックの外で行う（購読者が snapshot() や unsubscribe() を呼んでもよい）

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::domain::AppState;

type Listener = Arc<dyn Fn(&AppState) + Send + Sync>;

struct StoreInner {
    state: Mutex<AppState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

/// Shared handle; clones observe the same state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

/// Returned by [`StateStore::subscribe`]. Dropping it keeps the listener
/// registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(store) = self.store.upgrade() {
            store.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(AppState::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn snapshot(&self) -> AppState {
        self.inner.state.lock().clone()
    }

    pub fn subscribe(&self, listener: impl Fn(&AppState) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Mutate the state and notify every listener.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut AppState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.inner.state.lock();
            let result = mutate(&mut state);
            (result, state.clone())
        };
        self.notify(&snapshot);
        result
    }

    /// Mutate the state; listeners are notified only when `mutate` returns true.
    pub fn update_if(&self, mutate: impl FnOnce(&mut AppState) -> bool) -> bool {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if !mutate(&mut state) {
                return false;
            }
            state.clone()
        };
        self.notify(&snapshot);
        true
    }

    fn notify(&self, snapshot: &AppState) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_receive_full_snapshots() {
        let store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(move |s| sink.lock().push(s.is_loading));

        store.update(|s| s.is_loading = true);
        store.update(|s| s.is_loading = false);

        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = StateStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.update(|s| s.error = Some("x".into()));
        sub.unsubscribe();
        store.update(|s| s.error = None);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn update_if_skips_notification_when_nothing_changed() {
        let store = StateStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!store.update_if(|_| false));
        assert!(store.update_if(|s| {
            s.is_loading = true;
            true
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_read_the_store_during_notification() {
        let store = StateStore::new();
        let reader = store.clone();
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let _sub = store.subscribe(move |_| {
            *sink.lock() = Some(reader.snapshot().is_authenticated);
        });

        store.update(|s| s.is_authenticated = true);
        assert_eq!(*observed.lock(), Some(true));
    }

    #[test]
    fn independent_stores_do_not_share_state() {
        let a = StateStore::new();
        let b = StateStore::new();
        a.update(|s| s.is_authenticated = true);
        assert!(!b.snapshot().is_authenticated);
    }
}
