//! Capture pipeline tests
//!
//! These tests drive the orchestrator and stitcher against a scripted
//! in-memory driver; no Chrome/Chromium instance is required. The fake
//! clamps scroll offsets the way a real browser does and renders solid
//! non-white tiles so composite coverage is checkable pixel by pixel.

use image::{Rgba, RgbaImage};
use serde_json::{json, Value};
use sitesnap::browser::{PageDriver, SessionFactory};
use sitesnap::capture::{
    CaptureConfig, CaptureOrchestrator, PageCapture, PageDimensions, PageReadinessProbe,
    ProbeConfig, StitchConfig,
};
use sitesnap::error::{CaptureError, Error, NavigationError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TILE_COLOR: Rgba<u8> = Rgba([10, 20, 30, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Default)]
struct DriverLog {
    navigations: Vec<(String, Duration)>,
    viewports: Vec<(u32, u32)>,
    current_viewport: (u32, u32),
    scroll_y: u32,
    screenshots: usize,
    full_page_screenshots: usize,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NavBehavior {
    Ok,
    TimeoutFirst,
    FatalAlways,
}

struct FakeDriver {
    page_width: u32,
    page_height: u32,
    native: bool,
    native_fails: bool,
    /// Simulates a renderer that truncates tall single snapshots.
    snapshot_height_cap: Option<u32>,
    evaluate_fails: bool,
    nav: NavBehavior,
    log: Arc<Mutex<DriverLog>>,
}

impl FakeDriver {
    fn new(page_width: u32, page_height: u32) -> (Self, Arc<Mutex<DriverLog>>) {
        let log = Arc::new(Mutex::new(DriverLog {
            current_viewport: (1920, 1080),
            ..DriverLog::default()
        }));
        (
            Self {
                page_width,
                page_height,
                native: false,
                native_fails: false,
                snapshot_height_cap: None,
                evaluate_fails: false,
                nav: NavBehavior::Ok,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, TILE_COLOR);
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }
}

impl PageDriver for FakeDriver {
    fn supports_native_full_page(&self) -> bool {
        self.native
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.navigations.push((url.to_string(), timeout));
        match self.nav {
            NavBehavior::Ok => Ok(()),
            NavBehavior::TimeoutFirst if log.navigations.len() == 1 => {
                Err(NavigationError::Timeout(timeout.as_millis() as u64).into())
            }
            NavBehavior::TimeoutFirst => Ok(()),
            NavBehavior::FatalAlways => Err(Error::cdp("connection closed")),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        if self.evaluate_fails {
            return Err(Error::generic("script engine unavailable"));
        }
        if script.contains("window.scrollTo(0, document.body.scrollHeight)") {
            return Ok(json!(self.page_height));
        }
        if script.contains("readyState") {
            return Ok(json!("complete"));
        }
        if script.contains("scrollWidth") {
            return Ok(json!(self.page_width));
        }
        if script.contains("document.body.scrollHeight") {
            return Ok(json!(self.page_height));
        }
        if script.contains(".loading") {
            return Ok(json!(true));
        }
        if script.contains("freeze-style") {
            return Ok(json!(true));
        }
        if script.contains("new Promise") {
            return Ok(json!(true));
        }
        if script.contains("video, iframe") {
            return Ok(json!(false));
        }
        Ok(Value::Null)
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.viewports.push((width, height));
        log.current_viewport = (width, height);
        Ok(())
    }

    async fn scroll_to(&self, y: u32) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        let (_, viewport_height) = log.current_viewport;
        // Browsers clamp the offset so the viewport never passes the bottom.
        log.scroll_y = y.min(self.page_height.saturating_sub(viewport_height));
        Ok(())
    }

    async fn scroll_offset(&self) -> Result<u32> {
        Ok(self.log.lock().unwrap().scroll_y)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let (width, height) = {
            let mut log = self.log.lock().unwrap();
            log.screenshots += 1;
            log.current_viewport
        };
        let height = match self.snapshot_height_cap {
            Some(cap) => height.min(cap),
            None => height,
        };
        Ok(Self::png(width, height))
    }

    async fn full_page_screenshot(&self) -> Result<Vec<u8>> {
        if self.native_fails {
            return Err(CaptureError::ScreenshotFailed("native capture crashed".into()).into());
        }
        self.log.lock().unwrap().full_page_screenshots += 1;
        Ok(Self::png(self.page_width, self.page_height))
    }

    async fn close(self) -> Result<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

struct FakeFactory {
    queue: Mutex<VecDeque<FakeDriver>>,
    created: Arc<Mutex<usize>>,
}

impl FakeFactory {
    fn new(drivers: Vec<FakeDriver>) -> (Self, Arc<Mutex<usize>>) {
        let created = Arc::new(Mutex::new(0));
        (
            Self {
                queue: Mutex::new(drivers.into()),
                created: Arc::clone(&created),
            },
            created,
        )
    }
}

impl SessionFactory for FakeFactory {
    type Driver = FakeDriver;

    async fn create(&self) -> Result<FakeDriver> {
        let driver = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::generic("no more scripted drivers"))?;
        *self.created.lock().unwrap() += 1;
        Ok(driver)
    }
}

/// Capture config with every wait zeroed so tests run instantly.
fn fast_config() -> CaptureConfig {
    CaptureConfig {
        base_wait: Duration::ZERO,
        extra_media_wait: Duration::ZERO,
        settle_wait: Duration::ZERO,
        scroll_warmup: false,
        warmup_pause: Duration::ZERO,
        after_scroll_wait: Duration::ZERO,
        probe: ProbeConfig {
            spinner_poll: Duration::ZERO,
            height_poll: Duration::ZERO,
            ..ProbeConfig::default()
        },
        stitch: fast_stitch(),
        ..CaptureConfig::default()
    }
}

fn fast_stitch() -> StitchConfig {
    StitchConfig {
        resize_wait: Duration::ZERO,
        tile_wait: Duration::ZERO,
        ..StitchConfig::default()
    }
}

async fn orchestrator_for(
    driver: FakeDriver,
) -> CaptureOrchestrator<FakeFactory> {
    let (factory, _) = FakeFactory::new(vec![driver]);
    CaptureOrchestrator::new(factory, fast_config()).await.unwrap()
}

#[tokio::test]
async fn direct_capture_matches_page_dimensions() {
    let (driver, log) = FakeDriver::new(1200, 5000);
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator.capture_page("https://example.com/about").await;

    assert_eq!(image.dimensions(), (1200, 5000));
    let log = log.lock().unwrap();
    assert!(log.viewports.contains(&(1200, 5000)));
    assert_eq!(log.screenshots, 1);
    assert_eq!(log.full_page_screenshots, 0);
}

#[tokio::test]
async fn native_capture_used_when_supported() {
    let (mut driver, log) = FakeDriver::new(1000, 4000);
    driver.native = true;
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator.capture_page("https://example.com/").await;

    assert_eq!(image.dimensions(), (1000, 4000));
    let log = log.lock().unwrap();
    assert_eq!(log.full_page_screenshots, 1);
    assert_eq!(log.screenshots, 0);
}

#[tokio::test]
async fn native_failure_falls_back_to_viewport_capture() {
    let (mut driver, log) = FakeDriver::new(1000, 4000);
    driver.native = true;
    driver.native_fails = true;
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator.capture_page("https://example.com/").await;

    assert_eq!(image.dimensions(), (1000, 4000));
    assert_eq!(log.lock().unwrap().screenshots, 1);
}

#[tokio::test]
async fn tall_page_is_stitched_to_exact_dimensions() {
    let (driver, log) = FakeDriver::new(600, 20_000);
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator.capture_page("https://example.com/long").await;

    assert_eq!(image.dimensions(), (600, 20_000));
    // Overlapping 1080-tall tiles advanced by 780 px leave no unpainted rows.
    assert!(image.pixels().all(|p| *p != WHITE));

    let log = log.lock().unwrap();
    assert!(log.viewports.contains(&(600, 1080)));
    assert!(log.screenshots > 1);
}

#[tokio::test]
async fn wide_tall_page_is_stitched() {
    let (driver, log) = FakeDriver::new(2400, 10_001);
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator.capture_page("https://example.com/wide").await;

    assert_eq!(image.dimensions(), (2400, 10_001));
    // Stitch viewport width is capped at 1920 even for wider pages.
    assert!(log.lock().unwrap().viewports.contains(&(1920, 1080)));
}

#[tokio::test]
async fn truncated_direct_snapshot_triggers_stitch() {
    let (mut driver, log) = FakeDriver::new(800, 12_000);
    driver.snapshot_height_cap = Some(8_000);
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator.capture_page("https://example.com/deep").await;

    // 8000/12000 coverage is below the 0.9 threshold, so the stitcher runs
    // and still delivers the exact page size.
    assert_eq!(image.dimensions(), (800, 12_000));
    let log = log.lock().unwrap();
    assert!(log.viewports.contains(&(800, 1080)));
    assert!(log.screenshots > 1);
}

#[tokio::test]
async fn timeout_gets_one_degraded_retry_with_doubled_timeout() {
    let (mut driver, log) = FakeDriver::new(900, 20_000);
    driver.nav = NavBehavior::TimeoutFirst;
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator.capture_page("https://example.com/slow").await;

    // Degraded retry is a single viewport-limited snapshot, never stitched.
    assert_eq!(image.dimensions(), (900, 15_000));
    {
        let log = log.lock().unwrap();
        let timeouts: Vec<Duration> = log.navigations.iter().map(|(_, t)| *t).collect();
        assert_eq!(
            timeouts,
            vec![Duration::from_secs(180), Duration::from_secs(240)]
        );
    }

    // The relaxed timeout applies to the retry only.
    let _ = orchestrator.capture_page("https://example.com/next").await;
    let log = log.lock().unwrap();
    assert_eq!(log.navigations.last().unwrap().1, Duration::from_secs(180));
}

#[tokio::test]
async fn session_fatal_error_recreates_session() {
    let (mut crashed, crashed_log) = FakeDriver::new(1000, 3000);
    crashed.nav = NavBehavior::FatalAlways;
    let (fresh, fresh_log) = FakeDriver::new(1000, 3000);

    let (factory, created) = FakeFactory::new(vec![crashed, fresh]);
    let mut orchestrator = CaptureOrchestrator::new(factory, fast_config()).await.unwrap();

    let image = orchestrator.capture_page("https://example.com/").await;

    assert_eq!(image.dimensions(), (1000, 3000));
    assert_eq!(*created.lock().unwrap(), 2);
    assert!(crashed_log.lock().unwrap().closed);
    assert_eq!(fresh_log.lock().unwrap().navigations.len(), 1);
}

#[tokio::test]
async fn exhausted_factory_yields_placeholder() {
    let (mut crashed, _) = FakeDriver::new(1000, 3000);
    crashed.nav = NavBehavior::FatalAlways;

    let (factory, _) = FakeFactory::new(vec![crashed]);
    let mut orchestrator = CaptureOrchestrator::new(factory, fast_config()).await.unwrap();

    let image = orchestrator.capture_page("https://example.com/").await;
    assert_eq!(image.dimensions(), (1920, 1080));
    assert!(image.pixels().all(|p| *p == WHITE));
}

#[tokio::test]
async fn static_resource_skips_navigation() {
    let (driver, log) = FakeDriver::new(1000, 3000);
    let mut orchestrator = orchestrator_for(driver).await;

    let image = orchestrator
        .capture_page("https://example.com/assets/logo.png")
        .await;

    assert_eq!(image.dimensions(), (1, 1));
    assert!(log.lock().unwrap().navigations.is_empty());
}

#[tokio::test]
async fn failing_scripts_degrade_every_probe_stage() {
    let (mut driver, _) = FakeDriver::new(800, 600);
    driver.evaluate_fails = true;

    let probe = PageReadinessProbe::new(ProbeConfig::default());
    let warnings = probe.run(&driver).await;

    assert_eq!(warnings.len(), 5);
}

#[tokio::test]
async fn stitch_paste_positions_follow_achieved_offsets() {
    let (driver, log) = FakeDriver::new(500, 2500);

    let image = PageCapture::stitch(
        &driver,
        PageDimensions {
            width: 500,
            height: 2500,
        },
        &fast_stitch(),
    )
    .await
    .unwrap();

    assert_eq!(image.dimensions(), (500, 2500));
    assert!(image.pixels().all(|p| *p != WHITE));
    // Requested offsets 0, 780, 1560, 2340... but the driver clamps to
    // 2500 - 1080 = 1420, and the repeated clamped offset ends the loop.
    assert_eq!(log.lock().unwrap().scroll_y, 1420);
}

mod stitch_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Stitching terminates and fills the full canvas for any page
        /// height, including ones that are not multiples of the step.
        #[test]
        fn stitch_terminates_with_full_coverage(height in 1_200u32..20_000) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async move {
                let (driver, _) = FakeDriver::new(64, height);
                let image = PageCapture::stitch(
                    &driver,
                    PageDimensions { width: 64, height },
                    &fast_stitch(),
                )
                .await
                .unwrap();

                prop_assert_eq!(image.dimensions(), (64, height));
                prop_assert!(image.pixels().all(|p| *p != WHITE));
                Ok(())
            })?;
        }
    }
}
