//! Shared data structures exchanged between the render core, its backends, and the views.

use std::fmt;

/// Identifier for an opened document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Page identifier combines the parent document with the page index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    pub source_id: SourceId,
    pub index: u32,
}

impl PageId {
    pub fn new(source_id: SourceId, index: u32) -> Self {
        Self { source_id, index }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_id.as_str(), self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if both sides fit within `other`.
    pub fn fits_within(&self, other: ImageDimensions) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget {
    pub bytes_max: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self { bytes_max: 64 * 1000 * 1000 }
    }
}

/// Which on-screen purpose a view serves, relative to the current presentation page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewRole {
    /// Page shown to the audience.
    CurrentPublic,
    /// Copy of the current page on the presenter screen.
    CurrentPresenter,
    /// First page of the next slide.
    NextSlide,
    /// Next page within the current slide.
    NextTransition,
    /// Previous page within the current slide.
    PrevTransition,
    #[default]
    Unknown,
}

/// Why a view asked for a new render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RedrawCause {
    Resize,
    ForwardMove,
    BackwardMove,
    RandomMove,
    #[default]
    Unknown,
}

/// Kind of an in-flight render. Only requested renders are broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    Requested,
    Prefetch,
}

/// Handle returned by [`crate::RenderSystem::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}
