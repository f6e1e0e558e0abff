//! Render execution: deduplication, worker threads and prefetch strategies.

pub mod prefetch;
pub mod tracker;
pub mod worker;

pub use prefetch::{
    NoPrefetch, PrefetchStrategy, STRATEGY_NAMES, SlideLookahead, TransitionLookahead,
    strategy_from_name,
};
pub use tracker::{BeginStatus, InFlightTracker};
pub use worker::{JobOutcome, RenderJob, RenderedPage, WorkerPool, render_job};

pub type Result<T> = crate::Result<T>;
