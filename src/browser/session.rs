//! ChromiumOxide-backed browser session
//!
//! This module handles browser launch, the CDP event handler task, and the
//! [`PageDriver`] implementation used by the capture pipeline.

use crate::browser::driver::{PageDriver, SessionFactory};
use crate::error::{BrowserError, CaptureError, Error, NavigationError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Configuration for a capture session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Initial viewport width (default: 1920)
    pub width: u32,
    /// Initial viewport height (default: 1080)
    pub height: u32,
    /// Enable Chromium sandbox (default: true)
    pub sandbox: bool,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Whether to advertise the native full-page screenshot capability
    /// (default: true)
    pub native_full_page: bool,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            width: 1920,
            height: 1080,
            sandbox: true,
            chrome_path: None,
            native_full_page: true,
            extra_args: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Create a new config builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for [`SessionConfig`]
#[derive(Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Set viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Enable/disable the native full-page capture capability
    pub fn native_full_page(mut self, enabled: bool) -> Self {
        self.config.native_full_page = enabled;
        self
    }

    /// Add extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    /// Build the config
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// One live browser session: one browser process, one page.
///
/// Created at domain-processing start, destroyed at domain end or after an
/// unrecoverable failure (the orchestrator then asks [`CdpSessionFactory`]
/// for a replacement).
pub struct CdpSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    config: SessionConfig,
}

impl CdpSession {
    /// Launch a browser and open its single capture page.
    #[instrument(skip(config))]
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        info!("Launching browser (headless={})", config.headless);

        let mut builder = CdpBrowserConfig::builder();

        builder = builder.viewport(chromiumoxide::handler::viewport::Viewport {
            width: config.width,
            height: config.height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        });

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.arg("--no-sandbox");
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        // Rendering quality flags carried by every session.
        builder = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--force-device-scale-factor=1")
            .arg("--autoplay-policy=no-user-gesture-required")
            .arg(format!("--window-size={},{}", config.width, config.height));

        for arg in &config.extra_args {
            builder = builder.arg(arg);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| BrowserError::ConfigError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("Browser handler event error");
                    break;
                }
            }
            debug!("Browser handler finished");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            handler: handler_task,
            page,
            config: config.clone(),
        })
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn capture_png(&self, beyond_viewport: bool) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .from_surface(true)
            .capture_beyond_viewport(beyond_viewport)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::ScreenshotFailed(e.to_string()).into())
    }
}

impl PageDriver for CdpSession {
    fn supports_native_full_page(&self) -> bool {
        self.config.native_full_page
    }

    #[instrument(skip(self))]
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("file://")
        {
            return Err(NavigationError::InvalidUrl(format!(
                "URL must start with http://, https://, or file://: {}",
                url
            ))
            .into());
        }

        info!("Navigating to: {}", url);

        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| Error::cdp(e.to_string()))?;

        debug!("Navigation complete: {}", url);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(Error::cdp)?;

        let result = self.page.evaluate(params).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        debug!("Resizing viewport to {}x{}", width, height);

        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| CaptureError::ViewportFailed(e.to_string()))?;

        self.page.execute(params).await?;
        Ok(())
    }

    async fn scroll_to(&self, y: u32) -> Result<()> {
        self.evaluate(&format!("window.scrollTo(0, {});", y)).await?;
        Ok(())
    }

    async fn scroll_offset(&self) -> Result<u32> {
        let value = self.evaluate("window.pageYOffset;").await?;
        Ok(value.as_f64().unwrap_or(0.0).max(0.0) as u32)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.capture_png(false).await
    }

    async fn full_page_screenshot(&self) -> Result<Vec<u8>> {
        self.capture_png(true).await
    }

    #[instrument(skip(self))]
    async fn close(mut self) -> Result<()> {
        info!("Closing browser session");

        self.browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        let _ = tokio::time::timeout(Duration::from_secs(5), self.handler).await;

        info!("Browser session closed");
        Ok(())
    }
}

/// Factory producing [`CdpSession`] drivers from a shared [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct CdpSessionFactory {
    config: SessionConfig,
}

impl CdpSessionFactory {
    /// Create a factory for the given session configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for CdpSessionFactory {
    type Driver = CdpSession;

    async fn create(&self) -> Result<CdpSession> {
        CdpSession::launch(&self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert!(config.headless);
        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 1080);
        assert!(config.sandbox);
        assert!(config.native_full_page);
        assert!(config.chrome_path.is_none());
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::builder()
            .headless(false)
            .viewport(1280, 720)
            .sandbox(false)
            .chrome_path("/usr/bin/chromium")
            .native_full_page(false)
            .arg("--disable-extensions")
            .build();

        assert!(!config.headless);
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
        assert!(!config.sandbox);
        assert_eq!(config.chrome_path, Some("/usr/bin/chromium".to_string()));
        assert!(!config.native_full_page);
        assert_eq!(config.extra_args, vec!["--disable-extensions"]);
    }
}
