//! Fan-out of finished renders to subscribed views.
//!
//! Every subscriber sees every published render and decides for itself whether it is the one it
//! is waiting for. Handlers run on the publishing thread, outside any render system lock, so
//! they may subscribe, unsubscribe or submit new requests from inside the callback.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::warn;

use crate::codec::Pixmap;
use crate::render::RenderKey;
use crate::types::SubscriptionId;

/// Callback invoked with each published render.
pub type RenderHandler = dyn Fn(&RenderKey, &Arc<Pixmap>) + Send + Sync;

/// Registry of render subscribers.
#[derive(Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<RenderHandler>)>>,
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster").field("subscribers", &self.len()).finish()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&RenderKey, &Arc<Pixmap>) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Deliver a render to every subscriber, returning how many handlers ran to completion.
    pub fn publish(&self, key: &RenderKey, pixmap: &Arc<Pixmap>) -> usize {
        let handlers: Vec<Arc<RenderHandler>> =
            self.subscribers.read().iter().map(|(_, handler)| Arc::clone(handler)).collect();

        let mut delivered = 0;
        for handler in &handlers {
            let handler: &RenderHandler = &**handler;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(key, pixmap))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(%key, "render subscriber panicked"),
            }
        }
        delivered
    }
}
