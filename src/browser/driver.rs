//! Capability-based driver interface
//!
//! The capture pipeline never talks to a concrete browser engine; it talks to
//! a [`PageDriver`]. Engines with divergent capability sets (a native
//! full-page screenshot primitive exists on some backends only) are modeled
//! through `supports_native_full_page` rather than an engine-name branch.

use crate::error::Result;
use std::time::Duration;

/// The navigable session handle the capture pipeline drives.
///
/// One driver wraps exactly one live browser session. All operations are
/// best-effort from the pipeline's point of view; classification of the
/// returned errors (timeout vs. session-fatal vs. transient) happens in the
/// orchestrator.
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    /// Whether the backend exposes a one-shot full-page screenshot primitive.
    fn supports_native_full_page(&self) -> bool;

    /// Navigate to `url`, bounded by `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Execute a script in the page, resolving promises, returning the
    /// JSON-compatible result value (`null` when the script yields none).
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Resize the viewport.
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Scroll the page to vertical offset `y`.
    async fn scroll_to(&self, y: u32) -> Result<()>;

    /// Read back the achieved vertical scroll offset.
    ///
    /// Near the page bottom the browser clamps requested offsets, so this may
    /// differ from the last `scroll_to` argument.
    async fn scroll_offset(&self) -> Result<u32>;

    /// Capture the current viewport as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Capture the whole page as PNG bytes using the native primitive.
    ///
    /// Only meaningful when [`supports_native_full_page`] returns true.
    ///
    /// [`supports_native_full_page`]: PageDriver::supports_native_full_page
    async fn full_page_screenshot(&self) -> Result<Vec<u8>>;

    /// Tear the session down. Errors are the caller's to log and swallow.
    async fn close(self) -> Result<()>;
}

/// Creates fresh driver sessions.
///
/// The orchestrator owns one driver at a time; after a session-fatal error it
/// asks the factory for a replacement, so recreation is an explicit
/// constructor call rather than hidden driver state.
#[allow(async_fn_in_trait)]
pub trait SessionFactory {
    /// The driver type this factory produces.
    type Driver: PageDriver;

    /// Launch a new session.
    async fn create(&self) -> Result<Self::Driver>;
}
