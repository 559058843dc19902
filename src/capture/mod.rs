//! Full-page capture pipeline
//!
//! This is the capture core: readiness probing, media suppression, direct and
//! tiled screenshot capture, and the per-URL orchestration with its
//! timeout/retry/recovery policy.

pub mod orchestrator;
pub mod readiness;
pub mod stitcher;
pub mod suppress;

pub use orchestrator::{CaptureConfig, CaptureOrchestrator};
pub use readiness::{PageReadinessProbe, ProbeConfig, ProbeStage, ProbeWarning};
pub use stitcher::{measure_dimensions, PageCapture, PageDimensions, StitchConfig};
pub use suppress::MediaSuppressor;
