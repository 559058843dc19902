//! sitesnap CLI
//!
//! Captures full-page screenshots of every page listed in the given
//! sitemaps and assembles them into per-domain and combined PDFs.

use anyhow::Context;
use clap::Parser;
use sitesnap::pipeline::{Pipeline, PipelineConfig};
use sitesnap::SessionConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Sitemap-driven full-page website capture
#[derive(Parser, Debug)]
#[command(name = "sitesnap")]
#[command(version)]
#[command(about = "Capture full-page screenshots of sitemap-listed pages as PDFs")]
struct Args {
    /// File with one sitemap URL per line
    #[arg(long, default_value = "urls.txt")]
    urls_file: PathBuf,

    /// Directory for the generated PDFs
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Run the browser in headless mode
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    headless: bool,

    /// Seconds to wait after navigation before probing the page
    #[arg(long, default_value = "45")]
    wait_time: u64,

    /// Extra seconds to wait when the page contains media elements
    #[arg(long, default_value = "20")]
    extra_wait_for_media: u64,

    /// Page-load timeout in seconds
    #[arg(long, default_value = "180")]
    page_load_timeout: u64,

    /// Remove a domain's previous output before capturing it
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    clean: bool,

    /// Skip the final cross-domain merge
    #[arg(long)]
    skip_final_merge: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Disable the native full-page capture path (always stitch)
    #[arg(long)]
    no_native_capture: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> PipelineConfig {
        let mut session = SessionConfig::builder()
            .headless(self.headless)
            .native_full_page(!self.no_native_capture);
        if let Some(path) = self.chrome_path {
            session = session.chrome_path(path);
        }

        let mut config = PipelineConfig {
            urls_file: self.urls_file,
            output_dir: self.output_dir,
            clean: self.clean,
            skip_final_merge: self.skip_final_merge,
            session: session.build(),
            ..PipelineConfig::default()
        };
        config.capture.page_load_timeout = Duration::from_secs(self.page_load_timeout);
        config.capture.base_wait = Duration::from_secs(self.wait_time);
        config.capture.extra_media_wait = Duration::from_secs(self.extra_wait_for_media);
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    tracing::info!("sitesnap v{} starting", sitesnap::VERSION);

    let config = args.into_config();
    let summary = Pipeline::new(config)
        .run()
        .await
        .context("capture run failed")?;

    tracing::info!(
        "Done: {} page(s) across {} domain(s)",
        summary.total_pages(),
        summary.domains.len()
    );
    if let Some(final_pdf) = &summary.final_pdf {
        tracing::info!("Combined PDF: {}", final_pdf.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_headless_and_clean_on() {
        let args = Args::try_parse_from(["sitesnap"]).unwrap();
        assert!(args.headless);
        assert!(args.clean);
    }

    #[test]
    fn headless_and_clean_can_be_turned_off() {
        let args = Args::try_parse_from([
            "sitesnap",
            "--headless",
            "false",
            "--clean=false",
        ])
        .unwrap();
        assert!(!args.headless);
        assert!(!args.clean);
    }

    #[test]
    fn flags_flow_into_pipeline_config() {
        let args = Args::try_parse_from([
            "sitesnap",
            "--headless",
            "false",
            "--page-load-timeout",
            "60",
            "--skip-final-merge",
        ])
        .unwrap();
        let config = args.into_config();
        assert!(!config.session.headless);
        assert!(config.skip_final_merge);
        assert_eq!(config.capture.page_load_timeout, Duration::from_secs(60));
    }
}
