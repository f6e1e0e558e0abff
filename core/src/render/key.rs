//! Normalized render identity.

use std::fmt;

use crate::document::Document;
use crate::types::{ImageDimensions, PageId};

/// Page plus the exact pixel size it is rendered at.
///
/// Keys built with [`RenderKey::fit`] shrink the requested box to the largest size with the
/// page's aspect ratio, so views of slightly different shapes that end up showing the same
/// pixels share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderKey {
    page: Option<PageId>,
    size: ImageDimensions,
}

impl RenderKey {
    /// Key that is never rendered.
    pub fn null() -> Self {
        Self::default()
    }

    /// Key for `page` fitted in `bounds` using the page's height/width `ratio`.
    pub fn fit(page: PageId, ratio: f64, bounds: ImageDimensions) -> Self {
        Self { page: Some(page), size: fit_size(ratio, bounds) }
    }

    /// Key for an optional page, looking the aspect ratio up in `document`.
    pub fn for_page(
        document: &dyn Document,
        page: Option<PageId>,
        bounds: ImageDimensions,
    ) -> Self {
        match page {
            Some(page) => {
                let ratio = document.aspect_ratio(&page);
                Self::fit(page, ratio, bounds)
            }
            None => Self::null(),
        }
    }

    pub fn page(&self) -> Option<&PageId> {
        self.page.as_ref()
    }

    pub fn size(&self) -> ImageDimensions {
        self.size
    }

    pub fn is_null(&self) -> bool {
        self.page.is_none() || self.size.is_empty()
    }
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.page {
            Some(page) => write!(f, "{page}@{}", self.size),
            None => f.write_str("<null>"),
        }
    }
}

/// Largest size fitting in `bounds` with `height = ratio * width` (within rounding).
///
/// A box that already has the page's shape is returned unchanged, which makes fitting
/// idempotent: every result of this function is such a box.
pub fn fit_size(ratio: f64, bounds: ImageDimensions) -> ImageDimensions {
    if bounds.is_empty() || !ratio.is_finite() || ratio <= 0.0 {
        return ImageDimensions::default();
    }

    let (width, height) = (bounds.width, bounds.height);
    let height_for_width = scale(width, ratio);
    let width_for_height = scale(height, 1.0 / ratio);

    if height_for_width == height || width_for_height == width {
        return bounds;
    }

    let fitted = if height_for_width <= height {
        ImageDimensions::new(width, height_for_width)
    } else {
        ImageDimensions::new(width_for_height.min(width), height)
    };

    if fitted.is_empty() { ImageDimensions::default() } else { fitted }
}

fn scale(value: u32, factor: f64) -> u32 {
    let scaled = (f64::from(value) * factor).round();
    if scaled >= f64::from(u32::MAX) { u32::MAX } else { scaled as u32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceId;

    fn page(index: u32) -> PageId {
        PageId::new(SourceId::new("deck"), index)
    }

    fn dims(width: u32, height: u32) -> ImageDimensions {
        ImageDimensions::new(width, height)
    }

    #[test]
    fn wide_box_is_limited_by_height() {
        // 4:3 landscape page, height/width = 0.75
        assert_eq!(fit_size(0.75, dims(1920, 600)), dims(800, 600));
    }

    #[test]
    fn tall_box_is_limited_by_width() {
        assert_eq!(fit_size(0.75, dims(400, 1000)), dims(400, 300));
    }

    #[test]
    fn matching_box_is_kept() {
        assert_eq!(fit_size(0.75, dims(800, 600)), dims(800, 600));
    }

    #[test]
    fn fitting_is_idempotent() {
        let ratios = [0.75, 1.0, 1.4142, 0.5625, 0.3, 3.7, 0.0123];
        for &ratio in &ratios {
            for width in (1..300).step_by(7) {
                for height in (1..300).step_by(11) {
                    let once = fit_size(ratio, dims(width, height));
                    let twice = fit_size(ratio, once);
                    assert_eq!(once, twice, "ratio {ratio}, box {width}x{height}");
                    assert!(once.fits_within(dims(width, height)));
                }
            }
        }
    }

    #[test]
    fn fitted_size_keeps_aspect_within_rounding() {
        let ratio = 1.4142;
        for width in (10..500).step_by(13) {
            let fitted = fit_size(ratio, dims(width, 10_000));
            let expected = f64::from(fitted.width) * ratio;
            assert!((f64::from(fitted.height) - expected).abs() <= 0.5 + ratio);
        }
    }

    #[test]
    fn degenerate_inputs_produce_null_keys() {
        assert!(RenderKey::fit(page(0), 0.75, dims(0, 100)).is_null());
        assert!(RenderKey::fit(page(0), 0.75, dims(100, 0)).is_null());
        assert!(RenderKey::fit(page(0), f64::NAN, dims(100, 100)).is_null());
        // too thin to keep a single row of pixels
        assert!(RenderKey::fit(page(0), 0.001, dims(100, 100)).is_null());
        assert!(RenderKey::null().is_null());
        assert!(!RenderKey::fit(page(0), 0.75, dims(4, 3)).is_null());
    }

    #[test]
    fn equal_fits_share_identity() {
        let a = RenderKey::fit(page(3), 0.75, dims(800, 700));
        let b = RenderKey::fit(page(3), 0.75, dims(900, 600));
        let c = RenderKey::fit(page(4), 0.75, dims(800, 600));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "deck#3@800x600");
    }
}
