//! Batch pipeline
//!
//! Ties the pieces together: sitemap discovery, per-domain capture over one
//! exclusively-owned browser session, per-page PDFs, a combined PDF per
//! domain, and a final merge across domains. Domains are processed
//! sequentially; a failed domain is logged and skipped.

use crate::browser::{CdpSessionFactory, SessionConfig};
use crate::capture::{CaptureConfig, CaptureOrchestrator};
use crate::error::{Result, SitemapError};
use crate::pdf::{self, MergeInput, PdfGenerator};
use crate::sitemap::{DomainPages, SitemapFetcher};
use crate::util::{clean_domain_name, create_timestamp, page_file_name, unique_pdf_path};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// What to capture and where to put it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// File with one sitemap URL per line
    pub urls_file: PathBuf,
    /// Root output directory
    pub output_dir: PathBuf,
    /// Remove a domain's previous output before capturing it
    pub clean: bool,
    /// Skip the final cross-domain merge
    pub skip_final_merge: bool,
    /// Browser session settings, shared by every domain
    pub session: SessionConfig,
    /// Capture timing and retry policy
    pub capture: CaptureConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            urls_file: PathBuf::from("urls.txt"),
            output_dir: PathBuf::from("results"),
            clean: true,
            skip_final_merge: false,
            session: SessionConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

/// Outcome for one domain.
#[derive(Debug, Clone, Serialize)]
pub struct DomainSummary {
    /// The domain's host name
    pub domain: String,
    /// Page PDFs written
    pub pages_captured: usize,
    /// URLs the domain listed
    pub pages_total: usize,
    /// Combined per-domain PDF, when the merge succeeded
    pub combined_pdf: Option<PathBuf>,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    /// Run start, `YYYYmmdd_HHMMSS` local time
    pub started_at: String,
    /// Per-domain outcomes, in processing order
    pub domains: Vec<DomainSummary>,
    /// Cross-domain merged PDF, when produced
    pub final_pdf: Option<PathBuf>,
}

impl PipelineSummary {
    /// Total page PDFs written across all domains.
    pub fn total_pages(&self) -> usize {
        self.domains.iter().map(|d| d.pages_captured).sum()
    }
}

/// Sequential sitemap → capture → PDF batch runner.
pub struct Pipeline {
    config: PipelineConfig,
    generator: PdfGenerator,
}

impl Pipeline {
    /// Create a pipeline for the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            generator: PdfGenerator::default(),
        }
    }

    /// Run the whole batch.
    ///
    /// Fails only on the fatal preconditions: an unreadable urls file or
    /// zero discovered page URLs. Everything downstream degrades per URL
    /// or per domain.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PipelineSummary> {
        let started_at = create_timestamp();

        let fetcher = SitemapFetcher::with_defaults()?;
        let domains = fetcher.process_urls_file(&self.config.urls_file).await?;
        let total_urls: usize = domains.iter().map(|d| d.urls.len()).sum();
        if total_urls == 0 {
            return Err(SitemapError::NoUrls.into());
        }
        info!(
            "Discovered {} URLs across {} domain(s)",
            total_urls,
            domains.len()
        );

        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let mut summaries = Vec::with_capacity(domains.len());
        for domain in &domains {
            match self.capture_domain(domain).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!("Domain {} failed: {}", domain.domain, e);
                    summaries.push(DomainSummary {
                        domain: domain.domain.clone(),
                        pages_captured: 0,
                        pages_total: domain.urls.len(),
                        combined_pdf: None,
                    });
                }
            }
        }

        let final_pdf = if self.config.skip_final_merge {
            info!("Final merge disabled, leaving per-domain PDFs");
            None
        } else {
            self.merge_all(&summaries)
        };

        Ok(PipelineSummary {
            started_at,
            domains: summaries,
            final_pdf,
        })
    }

    /// Capture one domain's URLs over a fresh browser session and merge the
    /// resulting page PDFs.
    #[instrument(skip(self, domain), fields(domain = %domain.domain))]
    async fn capture_domain(&self, domain: &DomainPages) -> Result<DomainSummary> {
        let dir_name = clean_domain_name(&domain.domain);
        let domain_dir = self.config.output_dir.join(&dir_name);
        let pages_dir = domain_dir.join("pages");

        if self.config.clean && tokio::fs::try_exists(&domain_dir).await.unwrap_or(false) {
            info!("Cleaning previous output in {}", domain_dir.display());
            tokio::fs::remove_dir_all(&domain_dir).await?;
        }
        tokio::fs::create_dir_all(&pages_dir).await?;

        let factory = CdpSessionFactory::new(self.config.session.clone());
        let mut orchestrator =
            CaptureOrchestrator::new(factory, self.config.capture.clone()).await?;

        let mut page_pdfs = Vec::new();
        for (index, url) in domain.urls.iter().enumerate() {
            info!("[{}/{}] Capturing {}", index + 1, domain.urls.len(), url);
            let image = orchestrator.capture_page(url).await;

            let stem = page_file_name(url, index);
            let path = unique_pdf_path(&pages_dir, &stem);
            match self.generator.image_to_pdf(&image, &path) {
                Ok(()) => page_pdfs.push(MergeInput { title: stem, path }),
                Err(e) => error!("Failed to write PDF for {}: {}", url, e),
            }
        }
        orchestrator.close().await;

        let mut summary = DomainSummary {
            domain: domain.domain.clone(),
            pages_captured: page_pdfs.len(),
            pages_total: domain.urls.len(),
            combined_pdf: None,
        };
        if page_pdfs.is_empty() {
            warn!("No page PDFs produced for {}", domain.domain);
            return Ok(summary);
        }

        let combined = domain_dir.join(format!("{}_complete.pdf", dir_name));
        match pdf::merge(page_pdfs, &combined) {
            Ok(count) => {
                info!(
                    "Combined {} page(s) into {}",
                    count,
                    combined.display()
                );
                summary.combined_pdf = Some(combined);
            }
            Err(e) => error!("Could not combine PDFs for {}: {}", domain.domain, e),
        }
        Ok(summary)
    }

    /// Merge every domain's combined PDF into one document.
    fn merge_all(&self, summaries: &[DomainSummary]) -> Option<PathBuf> {
        let inputs: Vec<MergeInput> = summaries
            .iter()
            .filter_map(|s| {
                s.combined_pdf.as_ref().map(|path| MergeInput {
                    title: s.domain.clone(),
                    path: path.clone(),
                })
            })
            .collect();
        if inputs.is_empty() {
            warn!("Nothing to merge into the final PDF");
            return None;
        }

        let out = self.config.output_dir.join("all_sites.pdf");
        match pdf::merge(inputs, &out) {
            Ok(count) => {
                info!("Final PDF with {} site(s): {}", count, out.display());
                Some(out)
            }
            Err(e) => {
                error!("Final merge failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.urls_file, PathBuf::from("urls.txt"));
        assert_eq!(config.output_dir, PathBuf::from("results"));
        assert!(config.clean);
        assert!(!config.skip_final_merge);
    }

    #[tokio::test]
    async fn test_run_fails_without_urls_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            urls_file: dir.path().join("missing.txt"),
            output_dir: dir.path().join("out"),
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(config).run().await.is_err());
    }

    #[test]
    fn test_summary_totals() {
        let summary = PipelineSummary {
            started_at: "20250101_120000".to_string(),
            domains: vec![
                DomainSummary {
                    domain: "a.com".to_string(),
                    pages_captured: 3,
                    pages_total: 4,
                    combined_pdf: None,
                },
                DomainSummary {
                    domain: "b.com".to_string(),
                    pages_captured: 2,
                    pages_total: 2,
                    combined_pdf: None,
                },
            ],
            final_pdf: None,
        };
        assert_eq!(summary.total_pages(), 5);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = PipelineSummary {
            started_at: "20250101_120000".to_string(),
            domains: Vec::new(),
            final_pdf: Some(PathBuf::from("results/all_sites.pdf")),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("all_sites.pdf"));
    }
}
