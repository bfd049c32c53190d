use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Notify;

use crate::Result;

/// Outcome of one in-flight request, awaitable by every deduplicated caller.
pub(crate) type SharedResponse = Shared<BoxFuture<'static, Result<serde_json::Value>>>;

/// Cooperative cancellation flag shared between the client and a request task.
#[derive(Clone, Debug, Default)]
pub(crate) struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub(crate) fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub(crate) async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

struct PendingEntry {
    id: u64,
    key_prefix: String,
    response: SharedResponse,
    cancel: CancelHandle,
}

/// Requests currently on the wire, keyed by request key.
#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: HashMap<String, PendingEntry>,
    next_id: u64,
}

impl PendingRequests {
    /// Returns the in-flight response for `key`, if any.
    pub(crate) fn join(&self, key: &str) -> Option<SharedResponse> {
        self.entries.get(key).map(|entry| entry.response.clone())
    }

    /// Reserves the id the next [`insert`](Self::insert) should use.
    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    pub(crate) fn insert(
        &mut self,
        key: String,
        id: u64,
        key_prefix: String,
        response: SharedResponse,
        cancel: CancelHandle,
    ) {
        self.entries.insert(
            key,
            PendingEntry {
                id,
                key_prefix,
                response,
                cancel,
            },
        );
    }

    /// Removes `key` only if it still belongs to request `id`.
    pub(crate) fn remove(&mut self, key: &str, id: u64) -> bool {
        if self.entries.get(key).is_some_and(|entry| entry.id == id) {
            self.entries.remove(key);
            return true;
        }
        false
    }

    /// Cancels and removes every entry registered under `key_prefix`.
    pub(crate) fn cancel_matching(&mut self, key_prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.key_prefix == key_prefix)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            if let Some(entry) = self.entries.remove(key) {
                entry.cancel.cancel();
            }
        }
        keys.len()
    }

    /// Cancels and removes every entry.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let cancelled = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.cancel.cancel();
        }
        cancelled
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
