//! Prefetch strategies: guessing which renders a view will ask for next.
//!
//! A strategy looks at the request that was just made and calls `launch` with keys worth
//! rendering ahead of time. It never checks the cache or the in-flight set; the render system
//! filters launched keys the same way it filters requests, so a careless strategy costs at most
//! some wasted lookups.

use std::fmt;

use crate::document::{
    Document, next_slide_first_page, page_for_role, previous_slide_first_page,
};
use crate::error::ConfigError;
use crate::render::{RenderKey, Request};
use crate::types::{PageId, RedrawCause};

/// Names accepted by [`strategy_from_name`].
pub const STRATEGY_NAMES: [&str; 3] = ["none", "transitions", "slides"];

/// Decides which extra renders to start after a request.
pub trait PrefetchStrategy: Send + Sync {
    /// Identifier used in configuration files.
    fn name(&self) -> &str;

    /// Call `launch` for every key worth rendering in the background after `context`.
    fn prefetch(
        &self,
        context: &Request,
        document: &dyn Document,
        launch: &mut dyn FnMut(RenderKey),
    );
}

impl fmt::Debug for dyn PrefetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrefetchStrategy").field(&self.name()).finish()
    }
}

/// Build the strategy registered under `name`.
pub fn strategy_from_name(
    name: &str,
    depth: u32,
) -> std::result::Result<Box<dyn PrefetchStrategy>, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(Box::new(NoPrefetch)),
        "transitions" => Ok(Box::new(TransitionLookahead::new(depth))),
        "slides" => Ok(Box::new(SlideLookahead::new(depth))),
        _ => Err(ConfigError::UnknownStrategy {
            name: name.to_string(),
            known: STRATEGY_NAMES.join(", "),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn of(cause: RedrawCause) -> Self {
        match cause {
            RedrawCause::BackwardMove => Direction::Backward,
            _ => Direction::Forward,
        }
    }
}

/// Launch the key the requesting view would need if `current` became the presented page.
fn launch_for(
    context: &Request,
    document: &dyn Document,
    current: &PageId,
    launch: &mut dyn FnMut(RenderKey),
) {
    let shown = page_for_role(document, Some(current), context.role());
    let key = RenderKey::for_page(document, shown, context.box_size());
    if !key.is_null() {
        launch(key);
    }
}

/// Disables prefetching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrefetch;

impl PrefetchStrategy for NoPrefetch {
    fn name(&self) -> &str {
        "none"
    }

    fn prefetch(&self, _: &Request, _: &dyn Document, _: &mut dyn FnMut(RenderKey)) {}
}

/// Prepares the next `depth` page changes in the current navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionLookahead {
    depth: u32,
}

impl TransitionLookahead {
    pub fn new(depth: u32) -> Self {
        Self { depth }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl PrefetchStrategy for TransitionLookahead {
    fn name(&self) -> &str {
        "transitions"
    }

    fn prefetch(
        &self,
        context: &Request,
        document: &dyn Document,
        launch: &mut dyn FnMut(RenderKey),
    ) {
        let Some(mut current) = context.current_page().cloned() else {
            return;
        };
        let direction = Direction::of(context.cause());

        for _ in 0..self.depth {
            let index = match direction {
                Direction::Forward => current.index.checked_add(1),
                Direction::Backward => current.index.checked_sub(1),
            };
            let Some(next) = index.and_then(|index| document.page(index)) else {
                break;
            };
            launch_for(context, document, &next, launch);
            current = next;
        }
    }
}

/// Prepares every page of the next `depth` slides in the current navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideLookahead {
    depth: u32,
}

impl SlideLookahead {
    pub fn new(depth: u32) -> Self {
        Self { depth }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl PrefetchStrategy for SlideLookahead {
    fn name(&self) -> &str {
        "slides"
    }

    fn prefetch(
        &self,
        context: &Request,
        document: &dyn Document,
        launch: &mut dyn FnMut(RenderKey),
    ) {
        let Some(mut current) = context.current_page().cloned() else {
            return;
        };
        let direction = Direction::of(context.cause());

        for _ in 0..self.depth {
            let first = match direction {
                Direction::Forward => next_slide_first_page(document, &current),
                Direction::Backward => previous_slide_first_page(document, &current),
            };
            let Some(first) = first else {
                break;
            };

            let slide = document.slide_of(&first);
            let mut page = Some(first.clone());
            while let Some(visit) = page.filter(|p| document.slide_of(p) == slide) {
                launch_for(context, document, &visit, launch);
                page = visit.index.checked_add(1).and_then(|index| document.page(index));
            }
            current = first;
        }
    }
}
