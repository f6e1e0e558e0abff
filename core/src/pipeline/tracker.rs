//! Bookkeeping for renders currently executing on the worker pool.

use std::collections::HashMap;

use tracing::debug;

use crate::render::RenderKey;
use crate::types::RenderKind;

/// Outcome of [`InFlightTracker::try_begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginStatus {
    /// No render was running for the key; the caller must dispatch one.
    Started,
    /// A render is already running. `upgraded` is set when a prefetch became a requested render.
    AlreadyRunning { upgraded: bool },
}

/// Tracks which keys are being rendered and whether anyone is waiting for them.
///
/// A key is dispatched at most once until its completion is recorded. The kind of a running
/// render only ever moves from [`RenderKind::Prefetch`] to [`RenderKind::Requested`].
#[derive(Debug, Default)]
pub struct InFlightTracker {
    running: HashMap<RenderKey, RenderKind>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn kind_of(&self, key: &RenderKey) -> Option<RenderKind> {
        self.running.get(key).copied()
    }

    /// Register a render for `key`, deduplicating against running work.
    pub fn try_begin(&mut self, key: &RenderKey, kind: RenderKind) -> BeginStatus {
        match self.running.get_mut(key) {
            Some(running) => {
                let upgraded = *running == RenderKind::Prefetch && kind == RenderKind::Requested;
                if upgraded {
                    debug!(%key, "prefetch upgraded to requested render");
                    *running = RenderKind::Requested;
                }
                BeginStatus::AlreadyRunning { upgraded }
            }
            None => {
                self.running.insert(key.clone(), kind);
                BeginStatus::Started
            }
        }
    }

    /// Forget a finished render, returning the kind it held at that point.
    pub fn complete(&mut self, key: &RenderKey) -> Option<RenderKind> {
        self.running.remove(key)
    }
}
