//! Error types for SiteSnap
//!
//! This module provides a comprehensive error type hierarchy using `thiserror`
//! for proper error handling across all components.

use thiserror::Error;

/// The main error type for SiteSnap operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Capture errors (screenshot, stitching, decoding)
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Sitemap fetching/parsing errors
    #[error("Sitemap error: {0}")]
    Sitemap(#[from] SitemapError),

    /// PDF assembly errors
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Browser connection lost
    #[error("Browser connection lost")]
    ConnectionLost,

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),
}

/// Capture errors (screenshots, stitching, decoding)
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Screenshot failed
    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),

    /// Snapshot bytes could not be decoded into a raster image
    #[error("Snapshot decode failed: {0}")]
    DecodeFailed(String),

    /// Viewport resize failed
    #[error("Viewport resize failed: {0}")]
    ViewportFailed(String),

    /// Measured page dimensions were unusable
    #[error("Invalid page dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Measured width in pixels
        width: u32,
        /// Measured height in pixels
        height: u32,
    },
}

/// Sitemap fetching and parsing errors
#[derive(Error, Debug)]
pub enum SitemapError {
    /// HTTP request for the sitemap failed
    #[error("Sitemap fetch failed: {0}")]
    FetchFailed(String),

    /// Response was not an XML document
    #[error("Sitemap content is not XML: {0}")]
    NotXml(String),

    /// XML parse error
    #[error("Sitemap XML parse error: {0}")]
    ParseFailed(String),

    /// The urls file could not be read
    #[error("URLs file error: {0}")]
    UrlsFile(String),

    /// No page URLs were discovered in any sitemap
    #[error("No page URLs discovered in the provided sitemaps")]
    NoUrls,
}

/// PDF assembly errors
#[derive(Error, Debug)]
pub enum PdfError {
    /// Image could not be encoded for embedding
    #[error("Image encoding failed: {0}")]
    ImageEncode(String),

    /// lopdf document error
    #[error("PDF document error: {0}")]
    Document(#[from] lopdf::Error),

    /// Content stream error
    #[error("PDF content error: {0}")]
    Content(String),

    /// Nothing to merge
    #[error("No valid PDF documents to merge")]
    NothingToMerge,
}

/// Result type alias for SiteSnap operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Whether this error indicates the page load timed out.
    ///
    /// Timeouts get one degraded retry with relaxed timeouts instead of
    /// tearing the session down.
    pub fn is_navigation_timeout(&self) -> bool {
        matches!(self, Error::Navigation(NavigationError::Timeout(_)))
    }

    /// Whether this error indicates the browser session itself is gone.
    ///
    /// Session-fatal errors require discarding the driver and creating a
    /// fresh one before retrying.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::Cdp(_)
                | Error::Browser(BrowserError::ConnectionLost)
                | Error::Browser(BrowserError::LaunchFailed(_))
        )
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Browser(BrowserError::LaunchFailed("no chrome".to_string()));
        assert!(err.to_string().contains("Failed to launch browser"));
        assert!(err.to_string().contains("no chrome"));
    }

    #[test]
    fn test_navigation_timeout_classification() {
        let err = Error::Navigation(NavigationError::Timeout(180_000));
        assert!(err.is_navigation_timeout());
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn test_session_fatal_classification() {
        assert!(Error::Cdp("ws closed".to_string()).is_session_fatal());
        assert!(Error::Browser(BrowserError::ConnectionLost).is_session_fatal());
        assert!(
            !Error::Navigation(NavigationError::InvalidUrl("not-a-url".to_string()))
                .is_session_fatal()
        );
    }

    #[test]
    fn test_capture_error_display() {
        let err = CaptureError::InvalidDimensions {
            width: 0,
            height: 12000,
        };
        assert!(err.to_string().contains("0x12000"));
    }

    #[test]
    fn test_sitemap_error_display() {
        let err = SitemapError::NotXml("text/html".to_string());
        assert!(err.to_string().contains("text/html"));
    }

    #[test]
    fn test_generic_error() {
        let err = Error::generic("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }
}
