//! Page readiness probing
//!
//! A settled page is approximated through a sequence of heuristics: document
//! ready state, image completion, spinner visibility, scroll-height
//! stability, and AJAX idleness. Every stage carries its own timeout so a
//! slow stage cannot starve the rest, and every stage degrades to
//! "best-effort ready" instead of failing the capture.

use crate::browser::PageDriver;
use crate::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Per-stage timeouts and poll intervals for the readiness probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Bound on waiting for `document.readyState == "complete"`
    pub ready_timeout: Duration,
    /// Bound on waiting for all current `<img>` elements to settle
    pub images_timeout: Duration,
    /// Bound on waiting for loading indicators to disappear
    pub spinner_timeout: Duration,
    /// Poll interval for the spinner check
    pub spinner_poll: Duration,
    /// Bound on waiting for scroll-height stability
    pub height_timeout: Duration,
    /// Sample interval for the height check
    pub height_poll: Duration,
    /// Bound on waiting for the page's AJAX counter to reach zero
    pub ajax_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(60),
            images_timeout: Duration::from_secs(30),
            spinner_timeout: Duration::from_secs(15),
            spinner_poll: Duration::from_millis(500),
            height_timeout: Duration::from_secs(10),
            height_poll: Duration::from_secs(1),
            ajax_timeout: Duration::from_secs(10),
        }
    }
}

/// The probe stage a warning originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    /// Waiting for `document.readyState`
    ReadyState,
    /// Waiting for image completion
    Images,
    /// Waiting for loading indicators to hide
    Spinners,
    /// Waiting for scroll-height stability
    HeightStability,
    /// Waiting for the AJAX counter
    AjaxIdle,
    /// Media suppression pass
    Suppression,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeStage::ReadyState => "ready-state",
            ProbeStage::Images => "images",
            ProbeStage::Spinners => "spinners",
            ProbeStage::HeightStability => "height-stability",
            ProbeStage::AjaxIdle => "ajax-idle",
            ProbeStage::Suppression => "suppression",
        };
        f.write_str(name)
    }
}

/// A non-fatal degradation observed during probing or suppression.
///
/// Warnings formalize the "log and continue" contract: the orchestrator
/// records them but never treats a stage as failed.
#[derive(Debug, Clone)]
pub struct ProbeWarning {
    /// Stage the warning came from
    pub stage: ProbeStage,
    /// Human-readable description
    pub message: String,
}

impl ProbeWarning {
    /// Create a warning for `stage`.
    pub fn new(stage: ProbeStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    fn timeout(stage: ProbeStage, bound: Duration) -> Self {
        Self::new(stage, format!("timed out after {:?}", bound))
    }

    fn script(stage: ProbeStage, err: &Error) -> Self {
        Self::new(stage, format!("script execution failed: {}", err))
    }
}

impl fmt::Display for ProbeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "readiness stage {} degraded: {}", self.stage, self.message)
    }
}

const READY_STATE_JS: &str = "document.readyState";

const SCROLL_HEIGHT_JS: &str = "document.body.scrollHeight";

/// Resolves once every `<img>` present at evaluation time has loaded or
/// errored. The embedded timeout keeps the promise from hanging forever on a
/// stuck image.
fn images_settled_js(timeout_ms: u128) -> String {
    format!(
        r#"
        new Promise((resolve) => {{
            var images = document.getElementsByTagName('img');
            var total = images.length;
            var loaded = 0;
            if (total === 0) {{ resolve(true); return; }}
            function done() {{
                loaded++;
                if (loaded >= total) resolve(true);
            }}
            for (var i = 0; i < total; i++) {{
                var img = images[i];
                if (img.complete) {{
                    done();
                }} else {{
                    img.addEventListener('load', done);
                    img.addEventListener('error', done);
                }}
            }}
            setTimeout(function() {{ resolve(true); }}, {timeout_ms});
        }})
        "#
    )
}

const SPINNERS_HIDDEN_JS: &str = r#"
    (function() {
        var loaders = document.querySelectorAll(
            '.loading, .loader, [class*="loading"], [class*="loader"], [class*="progress"], .spinner'
        );
        for (var i = 0; i < loaders.length; i++) {
            var style = window.getComputedStyle(loaders[i]);
            if (style.display !== 'none' && style.visibility !== 'hidden' && style.opacity !== '0') {
                return false;
            }
        }
        return true;
    })()
"#;

/// Resolves once `jQuery.active` reaches zero; pages without jQuery resolve
/// immediately.
fn ajax_idle_js(timeout_ms: u128) -> String {
    format!(
        r#"
        new Promise((resolve) => {{
            if (typeof jQuery === 'undefined') {{ resolve(true); return; }}
            function check() {{
                if (jQuery.active === 0) {{ resolve(true); return; }}
                setTimeout(check, 500);
            }}
            check();
            setTimeout(function() {{ resolve(true); }}, {timeout_ms});
        }})
        "#
    )
}

/// Multi-stage readiness probe. Never fails; returns the warnings collected
/// from degraded stages.
#[derive(Debug, Clone, Default)]
pub struct PageReadinessProbe {
    config: ProbeConfig,
}

impl PageReadinessProbe {
    /// Create a probe with the given stage bounds.
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Run all stages in order against an already-navigated session.
    ///
    /// Blocks until the page is judged ready or every stage bound has
    /// elapsed; the returned warnings describe the stages that degraded.
    #[instrument(skip_all)]
    pub async fn run<D: PageDriver>(&self, driver: &D) -> Vec<ProbeWarning> {
        let mut warnings = Vec::new();

        if let Err(w) = self.wait_ready_state(driver).await {
            warnings.push(w);
        }
        if let Err(w) = self.wait_images(driver).await {
            warnings.push(w);
        }
        if let Err(w) = self.wait_spinners_hidden(driver).await {
            warnings.push(w);
        }
        if let Err(w) = self.wait_height_stable(driver).await {
            warnings.push(w);
        }
        if let Err(w) = self.wait_ajax_idle(driver).await {
            warnings.push(w);
        }

        debug!("Readiness probe finished with {} warning(s)", warnings.len());
        warnings
    }

    async fn wait_ready_state<D: PageDriver>(&self, driver: &D) -> Result<(), ProbeWarning> {
        let stage = ProbeStage::ReadyState;
        let deadline = Instant::now() + self.config.ready_timeout;

        loop {
            match driver.evaluate(READY_STATE_JS).await {
                Ok(value) => {
                    if value.as_str() == Some("complete") {
                        return Ok(());
                    }
                }
                Err(e) => return Err(ProbeWarning::script(stage, &e)),
            }
            if Instant::now() >= deadline {
                return Err(ProbeWarning::timeout(stage, self.config.ready_timeout));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn wait_images<D: PageDriver>(&self, driver: &D) -> Result<(), ProbeWarning> {
        let stage = ProbeStage::Images;
        let script = images_settled_js(self.config.images_timeout.as_millis());

        // Outer bound covers a stalled promise the in-page timeout missed.
        let outer = self.config.images_timeout + Duration::from_secs(5);
        match tokio::time::timeout(outer, driver.evaluate(&script)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeWarning::script(stage, &e)),
            Err(_) => Err(ProbeWarning::timeout(stage, outer)),
        }
    }

    async fn wait_spinners_hidden<D: PageDriver>(&self, driver: &D) -> Result<(), ProbeWarning> {
        let stage = ProbeStage::Spinners;
        let deadline = Instant::now() + self.config.spinner_timeout;

        loop {
            match driver.evaluate(SPINNERS_HIDDEN_JS).await {
                Ok(value) => {
                    if value.as_bool().unwrap_or(true) {
                        return Ok(());
                    }
                }
                Err(e) => return Err(ProbeWarning::script(stage, &e)),
            }
            if Instant::now() >= deadline {
                return Err(ProbeWarning::timeout(stage, self.config.spinner_timeout));
            }
            tokio::time::sleep(self.config.spinner_poll).await;
        }
    }

    async fn wait_height_stable<D: PageDriver>(&self, driver: &D) -> Result<(), ProbeWarning> {
        let stage = ProbeStage::HeightStability;
        let deadline = Instant::now() + self.config.height_timeout;
        let mut previous: i64 = -1;

        loop {
            let current = match driver.evaluate(SCROLL_HEIGHT_JS).await {
                Ok(value) => value.as_f64().unwrap_or(0.0) as i64,
                Err(e) => return Err(ProbeWarning::script(stage, &e)),
            };
            if current == previous {
                debug!("Page height stabilized at {}px", current);
                return Ok(());
            }
            previous = current;
            if Instant::now() >= deadline {
                return Err(ProbeWarning::timeout(stage, self.config.height_timeout));
            }
            tokio::time::sleep(self.config.height_poll).await;
        }
    }

    async fn wait_ajax_idle<D: PageDriver>(&self, driver: &D) -> Result<(), ProbeWarning> {
        let stage = ProbeStage::AjaxIdle;
        let script = ajax_idle_js(self.config.ajax_timeout.as_millis());

        let outer = self.config.ajax_timeout + Duration::from_secs(5);
        match tokio::time::timeout(outer, driver.evaluate(&script)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeWarning::script(stage, &e)),
            Err(_) => Err(ProbeWarning::timeout(stage, outer)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_config_default_bounds() {
        let config = ProbeConfig::default();
        assert_eq!(config.ready_timeout, Duration::from_secs(60));
        assert_eq!(config.images_timeout, Duration::from_secs(30));
        assert_eq!(config.spinner_timeout, Duration::from_secs(15));
        assert_eq!(config.height_timeout, Duration::from_secs(10));
        assert_eq!(config.ajax_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_warning_display() {
        let w = ProbeWarning::timeout(ProbeStage::Spinners, Duration::from_secs(15));
        let text = w.to_string();
        assert!(text.contains("spinners"));
        assert!(text.contains("timed out"));
    }

    #[test]
    fn test_images_script_embeds_timeout() {
        let script = images_settled_js(30_000);
        assert!(script.contains("30000"));
        assert!(script.contains("getElementsByTagName('img')"));
    }

    #[test]
    fn test_ajax_script_handles_missing_jquery() {
        let script = ajax_idle_js(10_000);
        assert!(script.contains("typeof jQuery === 'undefined'"));
    }
}
