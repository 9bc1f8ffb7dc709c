//! File-change notifications for the virtual tree.
//!
//! Provides `FileChangeEvent`, an `EventBus` for subscriptions and a `ChangeBatcher`
//! that coalesces events emitted within a short window into one batch. Order inside a
//! batch is emission order; observers should treat a batch as a set.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A change to one path of the virtual tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    pub path: String,
}

impl FileChangeEvent {
    pub fn created(path: impl Into<String>) -> Self {
        Self {
            kind: FileChangeKind::Created,
            path: path.into(),
        }
    }

    pub fn changed(path: impl Into<String>) -> Self {
        Self {
            kind: FileChangeKind::Changed,
            path: path.into(),
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            kind: FileChangeKind::Deleted,
            path: path.into(),
        }
    }
}

type Callback = Arc<dyn Fn(Vec<FileChangeEvent>) + Send + Sync>;

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving batches,
/// drop it to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus delivering change batches to subscribers. Wrap in `Arc` to subscribe.
#[derive(Default)]
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to batches. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(Vec<FileChangeEvent>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(i, _)| *i != id);
    }

    /// Deliver a batch to all subscribers.
    pub fn emit(&self, batch: Vec<FileChangeEvent>) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(batch.clone());
        }
    }
}

/// Micro-batching queue in front of an [`EventBus`].
///
/// Every push restarts the window timer; when it expires the buffered events go
/// out as a single batch.
pub struct ChangeBatcher {
    bus: Arc<EventBus>,
    window: Duration,
    pending: Arc<Mutex<Vec<FileChangeEvent>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeBatcher {
    pub fn new(bus: Arc<EventBus>, window: Duration) -> Self {
        Self {
            bus,
            window,
            pending: Arc::new(Mutex::new(Vec::new())),
            timer: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn push(&self, events: impl IntoIterator<Item = FileChangeEvent>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.extend(events);
        if pending.is_empty() {
            return;
        }
        drop(pending);

        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        // Outside a runtime there is no timer to wait on
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            drop(timer);
            self.flush();
            return;
        };

        let bus = Arc::clone(&self.bus);
        let pending = Arc::clone(&self.pending);
        let window = self.window;
        *timer = Some(runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let batch = std::mem::take(&mut *pending.lock().unwrap_or_else(|e| e.into_inner()));
            if !batch.is_empty() {
                bus.emit(batch);
            }
        }));
    }

    /// Emit whatever is buffered right now.
    pub fn flush(&self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        let batch = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        if !batch.is_empty() {
            self.bus.emit(batch);
        }
    }
}

impl Drop for ChangeBatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}
