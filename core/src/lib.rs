//! Asynchronous, memory-bounded page render cache with prefetching.
//!
//! Views describe the page they want and the box they have; the [`RenderSystem`] turns that into
//! a normalized [`RenderKey`], serves it from a compressed LRU cache or renders it on a worker
//! thread, and broadcasts finished renders to every subscriber. A pluggable
//! [`PrefetchStrategy`] renders likely next pages in the background.

#![deny(missing_debug_implementations)]

pub mod broadcast;
pub mod cache;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod log;
pub mod pipeline;
pub mod render;
pub mod slot;
pub mod stats;
pub mod system;
pub mod types;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use codec::{CompressedRender, PixelFormat, Pixmap};
pub use config::{ByteSize, PrefetchConfig, RenderConfig, format_size, parse_size};
pub use document::{Document, page_for_role};
pub use error::{ConfigError, RenderError, SizeParseError};
pub use pipeline::{NoPrefetch, PrefetchStrategy, SlideLookahead, TransitionLookahead};
pub use render::{RenderKey, Request};
pub use slot::PageSlot;
pub use stats::PerfSnapshot;
pub use system::RenderSystem;
pub use types::{
    CacheBudget, ImageDimensions, PageId, RedrawCause, RenderKind, SourceId, SubscriptionId,
    ViewRole,
};

/// Version of the core crate, for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_semver_version() {
        assert!(version().contains('.'));
    }

    #[test]
    fn key_identity_is_shared_across_views() {
        let page = PageId::new(SourceId::new("deck"), 3);
        let public = RenderKey::fit(page.clone(), 0.75, ImageDimensions::new(800, 600));
        let presenter = RenderKey::fit(page, 0.75, ImageDimensions::new(800, 900));

        assert_eq!(public, presenter);
        assert_eq!(public.to_string(), "deck#3@800x600");
    }
}
