//! Media suppression
//!
//! One injected DOM pass that freezes everything that would change between
//! tiles: videos, embeds, CSS animations, overlays, and fixed/sticky
//! elements. The pass is idempotent and never fails the caller.

use crate::browser::PageDriver;
use crate::capture::readiness::{ProbeStage, ProbeWarning};
use tracing::{debug, instrument};

/// Id of the injected animation-freeze stylesheet; its presence makes the
/// pass safe to repeat.
const FREEZE_STYLE_ID: &str = "sitesnap-freeze-style";

fn suppression_js() -> String {
    format!(
        r#"
        (function() {{
            // Pause and rewind videos.
            var videos = document.querySelectorAll('video');
            for (var i = 0; i < videos.length; i++) {{
                try {{
                    videos[i].pause();
                    videos[i].currentTime = 0;
                }} catch (e) {{}}
            }}

            // Disable autoplay on known video embeds.
            var iframes = document.querySelectorAll('iframe[src*="youtube"], iframe[src*="vimeo"]');
            for (var i = 0; i < iframes.length; i++) {{
                try {{
                    var iframe = iframes[i];
                    var src = iframe.getAttribute('src');
                    if (!src || src.indexOf('autoplay=0') > -1) continue;
                    var sep = src.indexOf('?') > -1 ? '&' : '?';
                    if (src.indexOf('youtube') > -1) {{
                        iframe.setAttribute('src', src + sep + 'autoplay=0&controls=0');
                    }} else {{
                        iframe.setAttribute('src', src + sep + 'autoplay=0');
                    }}
                }} catch (e) {{}}
            }}

            // Pause carousels and sliders.
            var carousels = document.querySelectorAll(
                '.carousel, .slider, [class*="carousel"], [class*="slider"], [class*="banner"]'
            );
            for (var i = 0; i < carousels.length; i++) {{
                carousels[i].style.animationPlayState = 'paused';
                carousels[i].style.webkitAnimationPlayState = 'paused';
            }}

            // Freeze CSS animations globally, once.
            if (!document.getElementById('{style_id}')) {{
                var styleSheet = document.createElement('style');
                styleSheet.id = '{style_id}';
                styleSheet.innerText =
                    '* {{ animation-play-state: paused !important; ' +
                    '-webkit-animation-play-state: paused !important; ' +
                    'transition: none !important; }}';
                document.head.appendChild(styleSheet);
            }}

            // Hide cookie banners, popups, modals, and overlays.
            var toHide = document.querySelectorAll(
                '.cookie-banner, .popup, .modal, .notification-bar, .toast, .overlay, ' +
                '[class*="cookie"], [class*="popup"], [class*="modal"], ' +
                '[class*="notification"], [class*="overlay"], [class*="toast"]'
            );
            for (var i = 0; i < toHide.length; i++) {{
                toHide[i].style.display = 'none';
            }}

            // Convert fixed/sticky elements to absolute at their current
            // coordinate so they appear once, not once per tile. Already
            // converted elements no longer compute as fixed/sticky, which
            // keeps the pass idempotent.
            var fixedCandidates = document.querySelectorAll(
                'header, footer, nav, .header, .footer, .nav, [class*="header"], ' +
                '[class*="footer"], [class*="navigation"], [class*="navbar"], ' +
                '[class*="nav-bar"], .fixed, .sticky'
            );
            for (var i = 0; i < fixedCandidates.length; i++) {{
                var element = fixedCandidates[i];
                var style = window.getComputedStyle(element);
                if (style.position === 'fixed' || style.position === 'sticky') {{
                    var rect = element.getBoundingClientRect();
                    element.style.position = 'absolute';
                    element.style.top = (rect.top + window.scrollY) + 'px';
                    element.style.left = (rect.left + window.scrollX) + 'px';
                    element.style.width = rect.width + 'px';
                    element.style.zIndex = '1';
                }}
            }}
            return true;
        }})()
        "#,
        style_id = FREEZE_STYLE_ID
    )
}

const HAS_MEDIA_JS: &str = r#"
    (function() {
        if (document.querySelectorAll('video, iframe[src*="youtube"], iframe[src*="vimeo"]').length > 0) {
            return true;
        }
        var images = document.getElementsByTagName('img');
        for (var i = 0; i < images.length; i++) {
            if (images[i].src.toLowerCase().endsWith('.gif')) return true;
        }
        return document.querySelectorAll(
            '[class*="animate"], [class*="slider"], [class*="carousel"], [class*="banner"]'
        ).length > 0;
    })()
"#;

/// Idempotent, best-effort DOM mutation pass.
pub struct MediaSuppressor;

impl MediaSuppressor {
    /// Apply the suppression pass. Returns a warning instead of an error so
    /// the caller logs and continues.
    #[instrument(skip_all)]
    pub async fn apply<D: PageDriver>(driver: &D) -> Result<(), ProbeWarning> {
        debug!("Suppressing media and repositioning fixed elements");
        driver
            .evaluate(&suppression_js())
            .await
            .map(|_| ())
            .map_err(|e| {
                ProbeWarning::new(
                    ProbeStage::Suppression,
                    format!("suppression script failed: {}", e),
                )
            })
    }

    /// Whether the page contains videos, embeds, GIFs, or animated sections.
    ///
    /// Errors count as "no media"; this only gates an extra settle wait.
    pub async fn has_media_elements<D: PageDriver>(driver: &D) -> bool {
        match driver.evaluate(HAS_MEDIA_JS).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_guards_style_injection() {
        let script = suppression_js();
        assert!(script.contains("getElementById('sitesnap-freeze-style')"));
        assert!(script.contains("styleSheet.id = 'sitesnap-freeze-style'"));
    }

    #[test]
    fn test_script_guards_iframe_rewrite() {
        // A second pass must not append autoplay params twice.
        let script = suppression_js();
        assert!(script.contains("src.indexOf('autoplay=0') > -1) continue"));
    }

    #[test]
    fn test_script_converts_fixed_to_absolute() {
        let script = suppression_js();
        assert!(script.contains("style.position === 'fixed' || style.position === 'sticky'"));
        assert!(script.contains("element.style.position = 'absolute'"));
    }

    #[test]
    fn test_has_media_script_covers_gifs() {
        assert!(HAS_MEDIA_JS.contains(".gif"));
        assert!(HAS_MEDIA_JS.contains("video"));
    }
}
