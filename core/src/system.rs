//! The render system: cache, in-flight deduplication, workers and broadcast behind one handle.
//!
//! Views [`submit`](RenderSystem::submit) requests and [`subscribe`](RenderSystem::subscribe)
//! to finished renders. A request is answered from the cache when possible, joins a render that
//! is already running when not, and otherwise dispatches a new job. Every request then gives the
//! prefetch strategy a chance to start background renders for pages the view is likely to show
//! next.
//!
//! Cache and tracker only change under a single mutex. Renders complete on a dedicated thread
//! that applies each outcome under that mutex and broadcasts after releasing it, so a subscriber
//! may call back into the system from its handler.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use flume::Receiver;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::broadcast::Broadcaster;
use crate::cache::RenderCache;
use crate::codec::{CompressedRender, Pixmap};
use crate::config::RenderConfig;
use crate::document::Document;
use crate::pipeline::prefetch::PrefetchStrategy;
use crate::pipeline::tracker::{BeginStatus, InFlightTracker};
use crate::pipeline::worker::{JobOutcome, RenderedPage, WorkerPool};
use crate::render::{RenderKey, Request};
use crate::stats::{PerfSnapshot, StatsCollector};
use crate::types::{RenderKind, SubscriptionId};
use crate::Result;

#[derive(Debug)]
struct State {
    cache: RenderCache,
    tracker: InFlightTracker,
    /// Completions whose broadcast has not returned yet.
    broadcasting: usize,
}

impl State {
    fn is_idle(&self) -> bool {
        self.tracker.is_empty() && self.broadcasting == 0
    }
}

struct Inner {
    document: Arc<dyn Document>,
    state: Mutex<State>,
    idle: Condvar,
    strategy: Box<dyn PrefetchStrategy>,
    broadcaster: Broadcaster,
    stats: StatsCollector,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("strategy", &self.strategy)
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

enum Lookup {
    Hit(Arc<CompressedRender>),
    Miss(BeginStatus),
}

/// Asynchronous, memory-bounded render cache with prefetching.
pub struct RenderSystem {
    inner: Arc<Inner>,
    pool: WorkerPool,
    completions: Option<JoinHandle<()>>,
}

impl fmt::Debug for RenderSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSystem")
            .field("inner", &self.inner)
            .field("workers", &self.pool.workers())
            .finish_non_exhaustive()
    }
}

impl RenderSystem {
    /// Start a render system with the prefetch strategy named in `config`.
    pub fn new(document: Arc<dyn Document>, config: &RenderConfig) -> Result<Self> {
        config.validate()?;
        let strategy = config.build_strategy()?;
        Self::with_strategy(document, config, strategy)
    }

    /// Start a render system with a caller-provided prefetch strategy.
    ///
    /// `config.prefetch` is ignored.
    pub fn with_strategy(
        document: Arc<dyn Document>,
        config: &RenderConfig,
        strategy: Box<dyn PrefetchStrategy>,
    ) -> Result<Self> {
        let budget = config.budget();
        let state = State {
            cache: RenderCache::new(budget),
            tracker: InFlightTracker::new(),
            broadcasting: 0,
        };
        let stats = StatsCollector::new();
        stats.update_cache_usage(0, budget.bytes_max as u64, 0);

        let inner = Arc::new(Inner {
            document: Arc::clone(&document),
            state: Mutex::new(state),
            idle: Condvar::new(),
            strategy,
            broadcaster: Broadcaster::new(),
            stats,
        });

        let (outcomes_tx, outcomes_rx) = flume::unbounded();
        let pool =
            WorkerPool::spawn(config.workers, document, config.compression_level, outcomes_tx)?;

        let completions = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("render-completions".to_string())
                .spawn(move || run_completions(&inner, outcomes_rx))
                .context("spawning render completion thread")?
        };

        info!(
            workers = pool.workers(),
            capacity = budget.bytes_max,
            strategy = inner.strategy.name(),
            "render system started"
        );

        Ok(Self { inner, pool, completions: Some(completions) })
    }

    /// Ask for a render. The result, if any, reaches subscribers through the broadcast.
    ///
    /// Requests with a null key are dropped without a cache lookup or any prefetching.
    pub fn submit(&self, request: Request) {
        let key = request.key().clone();
        if key.is_null() {
            trace!(?request, "dropping request without a renderable key");
            self.inner.stats.record_dropped_request();
            return;
        }

        let (lookup, in_flight) = {
            let mut state = self.inner.state.lock();
            match state.cache.get(&key).cloned() {
                Some(render) => (Lookup::Hit(render), state.tracker.len()),
                None => {
                    let status = state.tracker.try_begin(&key, RenderKind::Requested);
                    (Lookup::Miss(status), state.tracker.len())
                }
            }
        };
        self.inner.stats.record_cache_lookup(matches!(lookup, Lookup::Hit(_)));
        self.inner.stats.update_in_flight(in_flight);

        match lookup {
            Lookup::Hit(render) => self.inner.deliver_cached(&key, &render),
            Lookup::Miss(BeginStatus::Started) => self.dispatch(key, RenderKind::Requested),
            Lookup::Miss(BeginStatus::AlreadyRunning { upgraded }) => {
                debug!(%key, upgraded, "request joined running render");
                self.inner.stats.record_dedup(upgraded);
            }
        }

        self.inner.strategy.prefetch(&request, self.inner.document.as_ref(), &mut |key| {
            self.launch_prefetch(key)
        });
    }

    /// Register a handler for every finished requested render.
    ///
    /// Handlers run on the completion thread (or on the submitting thread for cache hits) and
    /// must filter by key themselves.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&RenderKey, &Arc<Pixmap>) + Send + Sync + 'static,
    {
        self.inner.broadcaster.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.broadcaster.unsubscribe(id)
    }

    /// Block until no render is running and the last broadcast returned.
    ///
    /// Returns `false` if `timeout` elapsed first. Must not be called from a subscriber.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.is_idle() {
            if self.inner.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    pub fn stats(&self) -> PerfSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn cached_len(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    pub fn cached_bytes(&self) -> usize {
        self.inner.state.lock().cache.bytes_used()
    }

    pub fn capacity(&self) -> usize {
        self.inner.state.lock().cache.capacity()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.state.lock().tracker.len()
    }

    /// Whether `key` is cached. Does not affect eviction order.
    pub fn is_cached(&self, key: &RenderKey) -> bool {
        self.inner.state.lock().cache.contains(key)
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.inner.document
    }

    pub fn strategy_name(&self) -> &str {
        self.inner.strategy.name()
    }

    fn launch_prefetch(&self, key: RenderKey) {
        if key.is_null() {
            return;
        }

        let status = {
            let mut state = self.inner.state.lock();
            if state.cache.touch(&key) {
                return;
            }
            state.tracker.try_begin(&key, RenderKind::Prefetch)
        };

        if status == BeginStatus::Started {
            trace!(%key, "prefetching");
            self.dispatch(key, RenderKind::Prefetch);
        }
    }

    fn dispatch(&self, key: RenderKey, kind: RenderKind) {
        if self.pool.dispatch(key.clone()) {
            self.inner.stats.record_dispatch(kind == RenderKind::Prefetch);
            return;
        }

        warn!(%key, "worker pool is shut down; render dropped");
        let mut state = self.inner.state.lock();
        state.tracker.complete(&key);
        self.inner.stats.update_in_flight(state.tracker.len());
        self.inner.idle.notify_all();
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        self.pool.shutdown();
        if let Some(handle) = self.completions.take() {
            // The last handle may be released by a subscriber running on the completion thread.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("render completion thread panicked");
            }
        }
        info!("render system stopped");
    }
}

fn run_completions(inner: &Inner, outcomes: Receiver<JobOutcome>) {
    while let Ok(outcome) = outcomes.recv() {
        inner.finish(outcome);
    }
    debug!("render completion thread exiting");
}

impl Inner {
    /// Apply a worker outcome and broadcast it if a view asked for it.
    fn finish(&self, outcome: JobOutcome) {
        let JobOutcome { key, rendered, elapsed } = outcome;

        let delivery = {
            let mut state = self.state.lock();
            let kind = state.tracker.complete(&key);

            let delivery = match rendered {
                Some(RenderedPage { compressed, pixmap }) => {
                    let (raw, packed) = (pixmap.pixels().len(), compressed.data().len());
                    self.stats.record_render(elapsed, raw, packed);
                    state.cache.put(key.clone(), Arc::new(compressed));
                    self.record_cache_state(&state.cache);
                    (kind == Some(RenderKind::Requested)).then_some(pixmap)
                }
                None => {
                    self.stats.record_failure();
                    None
                }
            };

            if delivery.is_some() {
                state.broadcasting += 1;
            }
            self.stats.update_in_flight(state.tracker.len());
            delivery
        };

        if let Some(pixmap) = delivery {
            self.broadcast(&key, &pixmap);
            self.state.lock().broadcasting -= 1;
        }
        self.idle.notify_all();
    }

    fn deliver_cached(&self, key: &RenderKey, render: &CompressedRender) {
        match render.decompress() {
            Ok(pixmap) => self.broadcast(key, &Arc::new(pixmap)),
            Err(err) => error!(%key, "cached render is corrupt: {err}"),
        }
    }

    fn broadcast(&self, key: &RenderKey, pixmap: &Arc<Pixmap>) {
        let delivered = self.broadcaster.publish(key, pixmap);
        self.stats.record_broadcast();
        trace!(%key, delivered, "render broadcast");
    }

    fn record_cache_state(&self, cache: &RenderCache) {
        let (used, capacity) = (cache.bytes_used() as u64, cache.capacity() as u64);
        self.stats.update_cache_usage(used, capacity, cache.len());
        self.stats.update_evictions(cache.evictions());
    }
}
