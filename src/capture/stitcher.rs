//! Direct and tiled capture
//!
//! Produces one raster of exactly the measured page size. Short pages go
//! through a single resized-viewport snapshot; tall pages are captured as
//! overlapping viewport tiles pasted into a composite at the scroll offset
//! the browser actually achieved.

use crate::browser::PageDriver;
use crate::error::{CaptureError, Result};
use image::{Rgba, RgbaImage};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Measured pixel dimensions of the loaded page.
///
/// Recomputed per capture attempt; never cached across navigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageDimensions {
    /// Full page width in pixels
    pub width: u32,
    /// Full page height in pixels
    pub height: u32,
}

const PAGE_HEIGHT_JS: &str = r#"
    Math.max(
        document.body.scrollHeight,
        document.body.offsetHeight,
        document.documentElement.clientHeight,
        document.documentElement.scrollHeight,
        document.documentElement.offsetHeight
    )
"#;

const PAGE_WIDTH_JS: &str = r#"
    Math.max(
        document.body.scrollWidth,
        document.body.offsetWidth,
        document.documentElement.clientWidth,
        document.documentElement.scrollWidth,
        document.documentElement.offsetWidth
    )
"#;

/// Measure the full page dimensions, including scrolled-out content.
pub async fn measure_dimensions<D: PageDriver>(driver: &D) -> Result<PageDimensions> {
    let width = driver.evaluate(PAGE_WIDTH_JS).await?.as_f64().unwrap_or(0.0) as u32;
    let height = driver.evaluate(PAGE_HEIGHT_JS).await?.as_f64().unwrap_or(0.0) as u32;

    if width == 0 || height == 0 {
        return Err(CaptureError::InvalidDimensions { width, height }.into());
    }
    Ok(PageDimensions { width, height })
}

/// Tuning for the direct/stitched capture decision and the stitching loop.
#[derive(Debug, Clone)]
pub struct StitchConfig {
    /// Pages taller than this always stitch (default: 15000)
    pub max_single_height: u32,
    /// Width component of the wide-page stitch trigger (default: 1920)
    pub wide_page_width: u32,
    /// Height component of the wide-page stitch trigger (default: 10000)
    pub wide_page_height: u32,
    /// Hard cap on the single-shot viewport height (default: 16000)
    pub viewport_height_cap: u32,
    /// Stitching viewport width, clamped to the page width (default: 1920)
    pub tile_width: u32,
    /// Stitching viewport height (default: 1080)
    pub tile_height: u32,
    /// Vertical overlap between consecutive tiles (default: 300)
    pub overlap: u32,
    /// Minimum fraction of the page a direct snapshot must cover before it
    /// is accepted (default: 0.9)
    pub min_coverage: f64,
    /// Settle wait after a viewport resize (default: 2 s)
    pub resize_wait: Duration,
    /// Settle wait after each scroll (default: 1 s)
    pub tile_wait: Duration,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            max_single_height: 15_000,
            wide_page_width: 1920,
            wide_page_height: 10_000,
            viewport_height_cap: 16_000,
            tile_width: 1920,
            tile_height: 1080,
            overlap: 300,
            min_coverage: 0.9,
            resize_wait: Duration::from_secs(2),
            tile_wait: Duration::from_secs(1),
        }
    }
}

impl StitchConfig {
    /// Whether a page of these dimensions must be stitched.
    pub fn needs_stitching(&self, dims: PageDimensions) -> bool {
        dims.height > self.max_single_height
            || (dims.width > self.wide_page_width && dims.height > self.wide_page_height)
    }

    /// Scroll advance per tile.
    fn step(&self) -> u32 {
        self.tile_height.saturating_sub(self.overlap).max(1)
    }

    /// Hard bound on tile count for a page of height `h`.
    fn tile_budget(&self, h: u32) -> usize {
        (h / self.step()) as usize + 4
    }
}

/// Full-page capture: native primitive, direct snapshot, or tiled stitch.
pub struct PageCapture;

impl PageCapture {
    /// Capture one raster of size exactly `(dims.width, dims.height)`.
    #[instrument(skip(driver, config))]
    pub async fn capture<D: PageDriver>(
        driver: &D,
        dims: PageDimensions,
        config: &StitchConfig,
    ) -> Result<RgbaImage> {
        if dims.width == 0 || dims.height == 0 {
            return Err(CaptureError::InvalidDimensions {
                width: dims.width,
                height: dims.height,
            }
            .into());
        }

        // Prefer the engine's native full-page primitive when available.
        if driver.supports_native_full_page() {
            match Self::native_capture(driver, dims).await {
                Ok(image) => return Ok(image),
                Err(e) => warn!("Native full-page capture failed, falling back: {}", e),
            }
        }

        if !config.needs_stitching(dims) {
            let view_height = dims.height.min(config.viewport_height_cap);
            driver.set_viewport(dims.width, view_height).await?;
            tokio::time::sleep(config.resize_wait).await;
            driver.scroll_to(0).await?;
            tokio::time::sleep(config.tile_wait).await;

            let snapshot = Self::decode(driver.screenshot().await?)?;
            debug!(
                "Direct snapshot is {}x{} for a {}x{} page",
                snapshot.width(),
                snapshot.height(),
                dims.width,
                dims.height
            );

            let coverage = snapshot.height() as f64 / dims.height as f64;
            if coverage >= config.min_coverage {
                return Ok(Self::normalize(snapshot, dims.width, dims.height));
            }
            info!(
                "Direct snapshot truncated ({:.0}% coverage), stitching instead",
                coverage * 100.0
            );
        }

        Self::stitch(driver, dims, config).await
    }

    async fn native_capture<D: PageDriver>(driver: &D, dims: PageDimensions) -> Result<RgbaImage> {
        info!("Using native full-page capture");
        let bytes = driver.full_page_screenshot().await?;
        let image = Self::decode(bytes)?;
        debug!("Native capture dimensions: {}x{}", image.width(), image.height());
        Ok(Self::normalize(image, dims.width, dims.height))
    }

    /// Tiled capture for pages too tall for one snapshot.
    ///
    /// Tiles are pasted at the scroll offset the browser actually achieved,
    /// not the requested one, which corrects for scroll clamping near the
    /// page bottom. The loop exits on height exhaustion, on two equal
    /// consecutive achieved offsets, or on the tile budget.
    #[instrument(skip(driver, config))]
    pub async fn stitch<D: PageDriver>(
        driver: &D,
        dims: PageDimensions,
        config: &StitchConfig,
    ) -> Result<RgbaImage> {
        info!(
            "Stitched capture for {}x{} page (viewport {}x{}, overlap {})",
            dims.width,
            dims.height,
            config.tile_width.min(dims.width),
            config.tile_height,
            config.overlap
        );

        let viewport_width = config.tile_width.min(dims.width);
        driver.set_viewport(viewport_width, config.tile_height).await?;
        tokio::time::sleep(config.resize_wait).await;

        let mut composite = RgbaImage::from_pixel(dims.width, dims.height, WHITE);
        let mut offset: u32 = 0;
        let mut last_scroll_pos: i64 = -1;
        let budget = config.tile_budget(dims.height);
        let mut tiles = 0usize;

        while offset < dims.height && tiles < budget {
            driver.scroll_to(offset).await?;
            tokio::time::sleep(config.tile_wait).await;

            let achieved = driver.scroll_offset().await?;
            if achieved as i64 == last_scroll_pos {
                info!("Page bottom reached at {}px", achieved);
                break;
            }
            last_scroll_pos = achieved as i64;

            let tile = Self::decode(driver.screenshot().await?)?;
            // Paste clips at the canvas edges.
            image::imageops::replace(&mut composite, &tile, 0, achieved as i64);
            debug!("Tile pasted at y={}px", achieved);

            tiles += 1;
            offset += config.step();
        }

        info!("Stitched capture complete ({} tiles)", tiles);
        Ok(composite)
    }

    fn decode(bytes: Vec<u8>) -> Result<RgbaImage> {
        let image = image::load_from_memory(&bytes)
            .map_err(|e| CaptureError::DecodeFailed(e.to_string()))?;
        Ok(image.to_rgba8())
    }

    /// Crop/pad a snapshot to exactly `(width, height)`, padding with white.
    fn normalize(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
        if image.width() == width && image.height() == height {
            return image;
        }
        let mut canvas = RgbaImage::from_pixel(width, height, WHITE);
        image::imageops::replace(&mut canvas, &image, 0, 0);
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> PageDimensions {
        PageDimensions { width, height }
    }

    #[test]
    fn test_stitch_decision_rule() {
        let config = StitchConfig::default();
        assert!(!config.needs_stitching(dims(1920, 15_000)));
        assert!(config.needs_stitching(dims(1920, 15_001)));
        assert!(!config.needs_stitching(dims(2400, 10_000)));
        assert!(config.needs_stitching(dims(2400, 10_001)));
        assert!(!config.needs_stitching(dims(800, 600)));
    }

    #[test]
    fn test_step_and_budget() {
        let config = StitchConfig::default();
        assert_eq!(config.step(), 780);
        assert_eq!(config.tile_budget(20_000), 20_000 / 780 + 4);
    }

    #[test]
    fn test_step_never_zero() {
        let config = StitchConfig {
            overlap: 2000,
            ..StitchConfig::default()
        };
        assert_eq!(config.step(), 1);
    }

    #[test]
    fn test_normalize_pads_short_snapshot() {
        let snapshot = RgbaImage::from_pixel(100, 80, Rgba([0, 0, 0, 255]));
        let normalized = PageCapture::normalize(snapshot, 100, 100);
        assert_eq!(normalized.dimensions(), (100, 100));
        assert_eq!(*normalized.get_pixel(50, 40), Rgba([0, 0, 0, 255]));
        assert_eq!(*normalized.get_pixel(50, 90), WHITE);
    }

    #[test]
    fn test_normalize_crops_tall_snapshot() {
        let snapshot = RgbaImage::from_pixel(100, 150, Rgba([0, 0, 0, 255]));
        let normalized = PageCapture::normalize(snapshot, 100, 100);
        assert_eq!(normalized.dimensions(), (100, 100));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = PageCapture::decode(vec![0, 1, 2, 3]);
        assert!(result.is_err());
    }
}
