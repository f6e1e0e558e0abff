use std::sync::Arc;

use render_core::render::fit_size;
use render_core::{
    ByteSize, ConfigError, Document, ImageDimensions, PageId, PixelFormat, Pixmap, RenderConfig,
    RenderKey, RenderSystem, SizeParseError, SourceId, format_size, parse_size,
};

#[derive(Debug)]
struct Blank;

impl Document for Blank {
    fn page_count(&self) -> u32 {
        1
    }

    fn page(&self, index: u32) -> Option<PageId> {
        (index == 0).then(|| PageId::new(SourceId::new("blank"), 0))
    }

    fn aspect_ratio(&self, _page: &PageId) -> f64 {
        1.414
    }

    fn render_page(&self, _page: &PageId, size: ImageDimensions) -> anyhow::Result<Pixmap> {
        Ok(Pixmap::filled(size, PixelFormat::Gray8, 255))
    }
}

#[test]
fn human_readable_sizes_round_trip() {
    assert_eq!(parse_size("10k"), Ok(10_000));
    assert_eq!(format_size(10_000), "10k");
    assert_eq!("64M".parse::<ByteSize>().map(ByteSize::bytes), Ok(64_000_000));
}

#[test]
fn malformed_capacity_is_reported() {
    assert!(matches!(parse_size("abc"), Err(SizeParseError::Invalid { .. })));

    let err = RenderConfig::default().with_cache_capacity("abc").unwrap_err();
    assert!(matches!(err, ConfigError::Capacity(_)));
}

#[test]
fn render_system_starts_from_json_config() {
    let config = RenderConfig::from_json_str(
        r#"{
            "cache_capacity": "5M",
            "workers": 2,
            "compression_level": 6,
            "prefetch": { "strategy": "slides", "depth": 1 }
        }"#,
    )
    .expect("valid config");

    let system = RenderSystem::new(Arc::new(Blank), &config).expect("start render system");
    assert_eq!(system.capacity(), 5_000_000);
    assert_eq!(system.strategy_name(), "slides");
}

#[test]
fn unknown_strategy_prevents_startup() {
    let config = RenderConfig::default().with_prefetch("clairvoyant", 3);
    let err = RenderSystem::new(Arc::new(Blank), &config).unwrap_err();

    let config_err = err.downcast_ref::<ConfigError>().expect("config error");
    assert!(matches!(config_err, ConfigError::UnknownStrategy { .. }));
}

#[test]
fn keys_fit_their_box_and_keep_the_aspect_ratio() {
    let ratio = Blank.aspect_ratio(&PageId::new(SourceId::new("blank"), 0));

    for (width, height) in [(800, 600), (600, 800), (1920, 1080), (3, 1000), (1, 1)] {
        let bounds = ImageDimensions::new(width, height);
        let size = fit_size(ratio, bounds);
        assert!(size.fits_within(bounds), "{size} does not fit {bounds}");
        assert_eq!(fit_size(ratio, size), size, "normalizing {size} again changed it");

        if !size.is_empty() {
            let actual = size.height as f64 / size.width as f64;
            let tolerance = 1.0 / size.width.min(size.height) as f64 + 1e-9;
            assert!((actual / ratio - 1.0).abs() <= tolerance, "{size} distorts the page");
        }
    }

    let key = RenderKey::for_page(&Blank, Blank.page(0), ImageDimensions::new(0, 500));
    assert!(key.is_null());
}
