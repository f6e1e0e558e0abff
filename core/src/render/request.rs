//! Render requests issued by views.

use crate::document::{Document, page_for_role};
use crate::types::{ImageDimensions, PageId, RedrawCause, ViewRole};

use super::key::RenderKey;

/// A view asking for the page it shows, fitted to its current size.
///
/// Besides the key, a request carries the context prefetch strategies use to guess what the
/// same view will ask for next: the presentation's current page, the view's box, its role and
/// what triggered the redraw.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    key: RenderKey,
    current_page: Option<PageId>,
    box_size: ImageDimensions,
    role: ViewRole,
    cause: RedrawCause,
}

impl Request {
    /// Build the request a view with `role` issues while `current_page` is presented.
    pub fn new(
        document: &dyn Document,
        current_page: Option<PageId>,
        box_size: ImageDimensions,
        role: ViewRole,
        cause: RedrawCause,
    ) -> Self {
        let shown = page_for_role(document, current_page.as_ref(), role);
        let key = RenderKey::for_page(document, shown, box_size);
        Self { key, current_page, box_size, role, cause }
    }

    /// Request for an explicit key, without navigation context.
    pub fn for_key(key: RenderKey) -> Self {
        let current_page = key.page().cloned();
        let box_size = key.size();
        Self {
            key,
            current_page,
            box_size,
            role: ViewRole::CurrentPublic,
            cause: RedrawCause::Unknown,
        }
    }

    pub fn key(&self) -> &RenderKey {
        &self.key
    }

    pub fn current_page(&self) -> Option<&PageId> {
        self.current_page.as_ref()
    }

    pub fn box_size(&self) -> ImageDimensions {
        self.box_size
    }

    pub fn role(&self) -> ViewRole {
        self.role
    }

    pub fn cause(&self) -> RedrawCause {
        self.cause
    }
}
