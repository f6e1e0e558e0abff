//! Runtime counters for the render system.
//!
//! The render system records render latency, cache effectiveness and how often deduplication
//! and prefetching kick in. Snapshots serialize to JSON for diagnostics overlays; backend
//! failures only surface here and in the logs.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

const DEFAULT_SAMPLE_CAPACITY: usize = 240;

#[derive(Debug, Default)]
struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn percentile(&self, percentile: f32) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f32> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let rank = percentile.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
        let index = rank.round() as usize;
        sorted.get(index).copied().unwrap_or(0.0)
    }

    fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().copied().sum();
        sum / self.samples.len() as f32
    }
}

#[derive(Debug)]
struct StatsInner {
    started_at: Instant,
    render_times_ms: SampleWindow,
    compression_ratios: SampleWindow,
    cache_requests: u64,
    cache_hits: u64,
    cache_bytes_used: u64,
    cache_bytes_capacity: u64,
    cache_entries: usize,
    cache_evictions: u64,
    jobs_dispatched: u64,
    dedup_hits: u64,
    upgrades: u64,
    prefetch_launched: u64,
    render_failures: u64,
    broadcasts: u64,
    dropped_requests: u64,
    in_flight: usize,
}

impl Default for StatsInner {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            render_times_ms: SampleWindow::new(DEFAULT_SAMPLE_CAPACITY),
            compression_ratios: SampleWindow::new(DEFAULT_SAMPLE_CAPACITY),
            cache_requests: 0,
            cache_hits: 0,
            cache_bytes_used: 0,
            cache_bytes_capacity: 0,
            cache_entries: 0,
            cache_evictions: 0,
            jobs_dispatched: 0,
            dedup_hits: 0,
            upgrades: 0,
            prefetch_launched: 0,
            render_failures: 0,
            broadcasts: 0,
            dropped_requests: 0,
            in_flight: 0,
        }
    }
}

/// Thread-safe counter collection shared between the render system and its workers.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: parking_lot::Mutex<StatsInner>,
}

impl StatsCollector {
    /// Create a new collector with default sampling capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful render+compress job.
    pub fn record_render(&self, duration: Duration, raw_bytes: usize, compressed_bytes: usize) {
        let mut guard = self.inner.lock();
        guard.render_times_ms.push(duration.as_secs_f64() as f32 * 1_000.0);
        if compressed_bytes > 0 {
            guard.compression_ratios.push(raw_bytes as f32 / compressed_bytes as f32);
        }
    }

    /// Record a job whose backend call or compression failed.
    pub fn record_failure(&self) {
        let mut guard = self.inner.lock();
        guard.render_failures = guard.render_failures.saturating_add(1);
    }

    /// Record whether a cache lookup produced a hit.
    pub fn record_cache_lookup(&self, hit: bool) {
        let mut guard = self.inner.lock();
        guard.cache_requests = guard.cache_requests.saturating_add(1);
        if hit {
            guard.cache_hits = guard.cache_hits.saturating_add(1);
        }
    }

    /// Update the aggregate cache usage counters.
    pub fn update_cache_usage(&self, used_bytes: u64, capacity_bytes: u64, entries: usize) {
        let mut guard = self.inner.lock();
        guard.cache_bytes_used = used_bytes;
        guard.cache_bytes_capacity = capacity_bytes;
        guard.cache_entries = entries;
    }

    /// Update the total number of evictions performed by the cache.
    pub fn update_evictions(&self, evictions: u64) {
        let mut guard = self.inner.lock();
        guard.cache_evictions = evictions;
    }

    /// Record a job handed to the worker pool.
    pub fn record_dispatch(&self, prefetch: bool) {
        let mut guard = self.inner.lock();
        guard.jobs_dispatched = guard.jobs_dispatched.saturating_add(1);
        if prefetch {
            guard.prefetch_launched = guard.prefetch_launched.saturating_add(1);
        }
    }

    /// Record a request answered by a render already in flight.
    pub fn record_dedup(&self, upgraded: bool) {
        let mut guard = self.inner.lock();
        guard.dedup_hits = guard.dedup_hits.saturating_add(1);
        if upgraded {
            guard.upgrades = guard.upgrades.saturating_add(1);
        }
    }

    /// Record a finished render delivered to subscribers.
    pub fn record_broadcast(&self) {
        let mut guard = self.inner.lock();
        guard.broadcasts = guard.broadcasts.saturating_add(1);
    }

    /// Record a request dropped because its key was null.
    pub fn record_dropped_request(&self) {
        let mut guard = self.inner.lock();
        guard.dropped_requests = guard.dropped_requests.saturating_add(1);
    }

    /// Update the number of renders currently executing or queued.
    pub fn update_in_flight(&self, in_flight: usize) {
        let mut guard = self.inner.lock();
        guard.in_flight = in_flight;
    }

    /// Generate a snapshot of the current counters.
    pub fn snapshot(&self) -> PerfSnapshot {
        let guard = self.inner.lock();

        let uptime = guard.started_at.elapsed();
        let cache_requests = guard.cache_requests.max(1);
        let cache_hit_ratio = guard.cache_hits as f32 / cache_requests as f32;

        PerfSnapshot {
            timestamp_ms: now_ms(),
            uptime_ms: uptime.as_millis() as u64,
            render_time_ms_p50: guard.render_times_ms.percentile(0.50),
            render_time_ms_p95: guard.render_times_ms.percentile(0.95),
            render_time_ms_mean: guard.render_times_ms.mean(),
            compression_ratio_mean: guard.compression_ratios.mean(),
            cache_hit_ratio,
            cache_requests: guard.cache_requests,
            cache_bytes_used: guard.cache_bytes_used,
            cache_bytes_capacity: guard.cache_bytes_capacity,
            cache_entries: guard.cache_entries,
            cache_evictions: guard.cache_evictions,
            jobs_dispatched: guard.jobs_dispatched,
            dedup_hits: guard.dedup_hits,
            upgrades: guard.upgrades,
            prefetch_launched: guard.prefetch_launched,
            render_failures: guard.render_failures,
            broadcasts: guard.broadcasts,
            dropped_requests: guard.dropped_requests,
            in_flight: guard.in_flight,
        }
    }
}

fn now_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(delta) => delta.as_millis() as u64,
        Err(err) => {
            warn!("system clock error: {err}");
            0
        }
    }
}

/// Immutable snapshot of the render counters.
#[derive(Debug, Clone, Serialize)]
pub struct PerfSnapshot {
    pub timestamp_ms: u64,
    pub uptime_ms: u64,
    pub render_time_ms_p50: f32,
    pub render_time_ms_p95: f32,
    pub render_time_ms_mean: f32,
    pub compression_ratio_mean: f32,
    pub cache_hit_ratio: f32,
    pub cache_requests: u64,
    pub cache_bytes_used: u64,
    pub cache_bytes_capacity: u64,
    pub cache_entries: usize,
    pub cache_evictions: u64,
    pub jobs_dispatched: u64,
    pub dedup_hits: u64,
    pub upgrades: u64,
    pub prefetch_launched: u64,
    pub render_failures: u64,
    pub broadcasts: u64,
    pub dropped_requests: u64,
    pub in_flight: usize,
}
