//! Subscriber-side state of a single view.
//!
//! Every view receives every broadcast render. A [`PageSlot`] remembers which key its view last
//! asked for and keeps only that render, so late results for a previous size or page are
//! discarded.

use std::sync::Arc;

use crate::codec::Pixmap;
use crate::document::Document;
use crate::render::{RenderKey, Request};
use crate::types::{ImageDimensions, PageId, RedrawCause, ViewRole};

#[derive(Debug, Clone, Default)]
pub struct PageSlot {
    role: ViewRole,
    current_page: Option<PageId>,
    box_size: ImageDimensions,
    current_key: RenderKey,
    awaiting: bool,
    shown: Option<Arc<Pixmap>>,
}

impl PageSlot {
    pub fn new(role: ViewRole) -> Self {
        Self { role, ..Self::default() }
    }

    pub fn role(&self) -> ViewRole {
        self.role
    }

    pub fn current_page(&self) -> Option<&PageId> {
        self.current_page.as_ref()
    }

    pub fn current_key(&self) -> &RenderKey {
        &self.current_key
    }

    /// Whether a render was requested and has not arrived yet.
    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    /// Render currently displayed, if any.
    pub fn shown(&self) -> Option<&Arc<Pixmap>> {
        self.shown.as_ref()
    }

    /// Follow the presentation to `page`. See [`PageSlot::update`].
    pub fn change_page(
        &mut self,
        document: &dyn Document,
        page: Option<PageId>,
        cause: RedrawCause,
    ) -> Option<Request> {
        self.current_page = page;
        self.refresh(document, cause)
    }

    /// Recompute the wanted key for the current page and a new view size.
    ///
    /// Returns the request to submit when the view now needs a different render. The displayed
    /// render is cleared whenever the key changes.
    pub fn update(
        &mut self,
        document: &dyn Document,
        box_size: ImageDimensions,
        cause: RedrawCause,
    ) -> Option<Request> {
        self.box_size = box_size;
        self.refresh(document, cause)
    }

    /// Offer a broadcast render. Returns `true` if it was the one this view was waiting for.
    pub fn receive(&mut self, key: &RenderKey, pixmap: &Arc<Pixmap>) -> bool {
        if !self.awaiting || *key != self.current_key {
            return false;
        }
        self.awaiting = false;
        self.shown = Some(Arc::clone(pixmap));
        true
    }

    fn refresh(&mut self, document: &dyn Document, cause: RedrawCause) -> Option<Request> {
        let request =
            Request::new(document, self.current_page.clone(), self.box_size, self.role, cause);
        if *request.key() == self.current_key {
            return None;
        }

        self.current_key = request.key().clone();
        self.shown = None;
        self.awaiting = !self.current_key.is_null();
        self.awaiting.then_some(request)
    }
}
