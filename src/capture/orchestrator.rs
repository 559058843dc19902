//! Per-URL capture orchestration
//!
//! Sequences navigation, readiness probing, media suppression, and capture
//! for each requested URL, and applies the timeout/retry/recovery policy.
//! One page's failure never reaches the per-domain loop as an error: the
//! worst outcome is a deterministic placeholder image.

use crate::browser::{PageDriver, SessionFactory};
use crate::capture::readiness::{PageReadinessProbe, ProbeConfig};
use crate::capture::stitcher::{measure_dimensions, PageCapture, PageDimensions, StitchConfig};
use crate::capture::suppress::MediaSuppressor;
use crate::error::{CaptureError, Result};
use crate::util::is_static_resource;
use image::{Rgba, RgbaImage};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Timeout, wait, and retry policy for the capture flow.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Page-load timeout (default: 180 s)
    pub page_load_timeout: Duration,
    /// Cap on the doubled retry timeout (default: 240 s)
    pub retry_timeout_cap: Duration,
    /// Fixed wait after navigation (default: 45 s)
    pub base_wait: Duration,
    /// Extra wait when the page contains media elements (default: 20 s)
    pub extra_media_wait: Duration,
    /// Small settle pause before capture (default: 2 s)
    pub settle_wait: Duration,
    /// Scroll to the bottom before probing so lazy content loads
    /// (default: true)
    pub scroll_warmup: bool,
    /// Pause between warmup scroll steps (default: 2 s)
    pub warmup_pause: Duration,
    /// Wait after the warmup scroll completes (default: 60 s)
    pub after_scroll_wait: Duration,
    /// Viewport height cap for degraded single captures (default: 15000)
    pub degraded_height_cap: u32,
    /// Dimensions of the blank fallback placeholder (default: 1920x1080)
    pub fallback_size: (u32, u32),
    /// Readiness probe stage bounds
    pub probe: ProbeConfig,
    /// Direct/stitched capture tuning
    pub stitch: StitchConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            page_load_timeout: Duration::from_secs(180),
            retry_timeout_cap: Duration::from_secs(240),
            base_wait: Duration::from_secs(45),
            extra_media_wait: Duration::from_secs(20),
            settle_wait: Duration::from_secs(2),
            scroll_warmup: true,
            warmup_pause: Duration::from_secs(2),
            after_scroll_wait: Duration::from_secs(60),
            degraded_height_cap: 15_000,
            fallback_size: (1920, 1080),
            probe: ProbeConfig::default(),
            stitch: StitchConfig::default(),
        }
    }
}

/// Drives captures for one domain's URLs over one exclusively-owned session.
pub struct CaptureOrchestrator<F: SessionFactory> {
    factory: F,
    driver: F::Driver,
    probe: PageReadinessProbe,
    config: CaptureConfig,
}

impl<F: SessionFactory> CaptureOrchestrator<F> {
    /// Create an orchestrator and launch its first session.
    pub async fn new(factory: F, config: CaptureConfig) -> Result<Self> {
        let driver = factory.create().await?;
        let probe = PageReadinessProbe::new(config.probe.clone());
        Ok(Self {
            factory,
            driver,
            probe,
            config,
        })
    }

    /// Borrow the current driver.
    pub fn driver(&self) -> &F::Driver {
        &self.driver
    }

    /// Capture one URL, returning a finished raster.
    ///
    /// Never fails: a navigation timeout gets one degraded retry with a
    /// doubled (capped) page-load timeout, a session-fatal error gets a
    /// fresh session and one degraded retry, and anything else yields the
    /// blank placeholder. Static-resource URLs short-circuit to a 1x1
    /// placeholder without navigating.
    #[instrument(skip(self))]
    pub async fn capture_page(&mut self, url: &str) -> RgbaImage {
        if is_static_resource(url) {
            info!("Skipping static resource: {}", url);
            return RgbaImage::from_pixel(1, 1, WHITE);
        }

        match self.try_capture(url).await {
            Ok(image) => image,
            Err(e) if e.is_navigation_timeout() => {
                warn!("Page load timed out for {}, retrying with a longer timeout", url);
                let relaxed = (self.config.page_load_timeout * 2).min(self.config.retry_timeout_cap);
                match self.degraded_capture(url, relaxed).await {
                    Ok(image) => image,
                    Err(e2) => {
                        error!("Degraded retry failed for {}: {}", url, e2);
                        self.blank_placeholder()
                    }
                }
            }
            Err(e) if e.is_session_fatal() => {
                error!("Session-fatal error for {}: {}; restarting browser", url, e);
                match self.recreate_session().await {
                    Ok(()) => match self.degraded_capture(url, self.config.page_load_timeout).await
                    {
                        Ok(image) => image,
                        Err(e2) => {
                            error!("Retry on fresh session failed for {}: {}", url, e2);
                            self.blank_placeholder()
                        }
                    },
                    Err(e2) => {
                        error!("Could not recreate browser session: {}", e2);
                        self.blank_placeholder()
                    }
                }
            }
            Err(e) => {
                error!("Capture failed for {}: {}", url, e);
                self.blank_placeholder()
            }
        }
    }

    /// Tear down the session. Teardown errors are logged and swallowed.
    pub async fn close(self) {
        if let Err(e) = self.driver.close().await {
            warn!("Error closing browser session: {}", e);
        }
    }

    async fn try_capture(&self, url: &str) -> Result<RgbaImage> {
        self.driver
            .navigate(url, self.config.page_load_timeout)
            .await?;
        tokio::time::sleep(self.config.base_wait).await;

        if self.config.scroll_warmup {
            self.scroll_warmup().await;
        }

        for warning in self.probe.run(&self.driver).await {
            warn!("{}", warning);
        }

        if let Err(warning) = MediaSuppressor::apply(&self.driver).await {
            warn!("{}", warning);
        }

        if !self.config.extra_media_wait.is_zero()
            && MediaSuppressor::has_media_elements(&self.driver).await
        {
            info!("Media elements present, waiting an extra {:?}", self.config.extra_media_wait);
            tokio::time::sleep(self.config.extra_media_wait).await;
        }

        tokio::time::sleep(self.config.settle_wait).await;

        let dims = measure_dimensions(&self.driver).await?;
        info!("Page dimensions: {}x{}px", dims.width, dims.height);

        PageCapture::capture(&self.driver, dims, &self.config.stitch).await
    }

    /// Single viewport-height-limited capture used by both retry paths.
    /// No stitching: the page already proved itself troublesome.
    async fn degraded_capture(&self, url: &str, timeout: Duration) -> Result<RgbaImage> {
        self.driver.navigate(url, timeout).await?;
        tokio::time::sleep(self.config.base_wait * 2).await;

        if let Err(warning) = MediaSuppressor::apply(&self.driver).await {
            warn!("{}", warning);
        }

        let (fw, fh) = self.config.fallback_size;
        let dims = measure_dimensions(&self.driver)
            .await
            .unwrap_or(PageDimensions {
                width: fw,
                height: fh,
            });

        self.driver
            .set_viewport(
                dims.width.max(1),
                dims.height.min(self.config.degraded_height_cap).max(1),
            )
            .await?;
        tokio::time::sleep(self.config.settle_wait).await;

        let bytes = self.driver.screenshot().await?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| CaptureError::DecodeFailed(e.to_string()))?;
        Ok(image.to_rgba8())
    }

    /// Scroll to the bottom until the height stops growing, then wait for
    /// late-loading content. Best-effort: failures are logged only.
    async fn scroll_warmup(&self) {
        let mut last_height: i64 = -1;
        for _ in 0..20 {
            let result = self
                .driver
                .evaluate("window.scrollTo(0, document.body.scrollHeight); document.body.scrollHeight")
                .await;
            let height = match result {
                Ok(value) => value.as_f64().unwrap_or(0.0) as i64,
                Err(e) => {
                    warn!("Scroll warmup failed: {}", e);
                    return;
                }
            };
            if height == last_height {
                break;
            }
            last_height = height;
            tokio::time::sleep(self.config.warmup_pause).await;
        }
        tokio::time::sleep(self.config.after_scroll_wait).await;
    }

    async fn recreate_session(&mut self) -> Result<()> {
        let fresh = self.factory.create().await?;
        let crashed = std::mem::replace(&mut self.driver, fresh);
        if let Err(e) = crashed.close().await {
            warn!("Error closing crashed session: {}", e);
        }
        Ok(())
    }

    fn blank_placeholder(&self) -> RgbaImage {
        let (width, height) = self.config.fallback_size;
        RgbaImage::from_pixel(width, height, WHITE)
    }
}
