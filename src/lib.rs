//! sitesnap - Sitemap-Driven Full-Page Website Capture
//!
//! This crate walks XML sitemaps, captures a full-page screenshot of every
//! listed page with a headless Chromium instance, and assembles the results
//! into per-domain and cross-domain PDF documents.
//!
//! # Features
//!
//! - **Sitemap discovery**: urlset and nested sitemapindex documents
//! - **Readiness probing**: layered heuristics for "the page has settled"
//! - **Media suppression**: freezes video, animation, and sticky chrome
//! - **Full-page capture**: native CDP capture with a tiled-stitch fallback
//! - **PDF assembly**: one PDF per page, merged with bookmarks per domain
//!
//! # Architecture
//!
//! ```text
//! urls.txt ──▶ Sitemap Fetcher ──▶ Pipeline (per domain, sequential)
//!                                      │
//!                                      ▼
//!                            Capture Orchestrator ──▶ CDP Session
//!                             │ readiness probe
//!                             │ media suppression
//!                             │ direct / stitched capture
//!                                      │
//!                                      ▼
//!                         pages/*.pdf ─▶ <domain>_complete.pdf ─▶ all_sites.pdf
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sitesnap::pipeline::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(PipelineConfig::default());
//!     let summary = pipeline.run().await?;
//!     println!("Captured {} pages", summary.total_pages());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod capture;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod sitemap;
pub mod util;

// Re-exports for convenience
pub use browser::{CdpSession, CdpSessionFactory, PageDriver, SessionConfig, SessionFactory};
pub use capture::{CaptureConfig, CaptureOrchestrator, MediaSuppressor, PageReadinessProbe};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineConfig, PipelineSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
