//! Boundary between the render core and the document that owns the pages.
//!
//! The core never parses documents itself. A [`Document`] implementation rasterizes pages on
//! demand and describes how pages are grouped into slides; everything else (navigation targets
//! for each view role, prefetch neighbours) is derived here from those primitives.

use crate::codec::Pixmap;
use crate::types::{ImageDimensions, PageId, ViewRole};

/// Page rendering collaborator.
///
/// `render_page` is called from worker threads. The render system guarantees that no two
/// workers render the same key at the same time, but different keys are rendered concurrently.
pub trait Document: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Identity of the page at `index`, if it exists.
    fn page(&self, index: u32) -> Option<PageId>;

    /// Height divided by width of the page's intrinsic size.
    fn aspect_ratio(&self, page: &PageId) -> f64;

    /// Rasterize `page` at exactly `size` pixels.
    fn render_page(&self, page: &PageId, size: ImageDimensions) -> anyhow::Result<Pixmap>;

    /// Slide a page belongs to. Consecutive pages of the same slide are transitions.
    fn slide_of(&self, page: &PageId) -> u32 {
        page.index
    }
}

/// Page after `page` if it belongs to the same slide.
pub fn next_transition(document: &dyn Document, page: &PageId) -> Option<PageId> {
    let next = document.page(page.index.checked_add(1)?)?;
    (document.slide_of(&next) == document.slide_of(page)).then_some(next)
}

/// Page before `page` if it belongs to the same slide.
pub fn previous_transition(document: &dyn Document, page: &PageId) -> Option<PageId> {
    let previous = document.page(page.index.checked_sub(1)?)?;
    (document.slide_of(&previous) == document.slide_of(page)).then_some(previous)
}

/// First page of the slide following the one `page` belongs to.
pub fn next_slide_first_page(document: &dyn Document, page: &PageId) -> Option<PageId> {
    let slide = document.slide_of(page);
    (page.index.saturating_add(1)..document.page_count())
        .filter_map(|index| document.page(index))
        .find(|candidate| document.slide_of(candidate) != slide)
}

/// First page of the slide preceding the one `page` belongs to.
pub fn previous_slide_first_page(document: &dyn Document, page: &PageId) -> Option<PageId> {
    let slide = document.slide_of(page);
    let last_of_previous = (0..page.index)
        .rev()
        .filter_map(|index| document.page(index))
        .find(|candidate| document.slide_of(candidate) != slide)?;
    let previous_slide = document.slide_of(&last_of_previous);

    let mut first = last_of_previous;
    while let Some(candidate) = first.index.checked_sub(1).and_then(|index| document.page(index))
    {
        if document.slide_of(&candidate) != previous_slide {
            break;
        }
        first = candidate;
    }
    Some(first)
}

/// Page a view with `role` shows while `current` is the presentation page.
pub fn page_for_role(
    document: &dyn Document,
    current: Option<&PageId>,
    role: ViewRole,
) -> Option<PageId> {
    let current = current?;
    match role {
        ViewRole::CurrentPublic | ViewRole::CurrentPresenter => Some(current.clone()),
        ViewRole::NextSlide => next_slide_first_page(document, current),
        ViewRole::NextTransition => next_transition(document, current),
        ViewRole::PrevTransition => previous_transition(document, current),
        ViewRole::Unknown => None,
    }
}
