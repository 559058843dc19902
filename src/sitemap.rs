//! Sitemap XML fetching and parsing
//!
//! Turns a urls file (one sitemap URL per line) into an ordered list of
//! domains, each with its deduplicated page URLs. Sitemap-index documents
//! are followed recursively with a visited-set guard; per-sitemap failures
//! are logged and skipped rather than aborting the batch.

use crate::error::{Result, SitemapError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Page URLs discovered for one domain, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPages {
    /// The sitemap's host
    pub domain: String,
    /// Deduplicated page URLs
    pub urls: Vec<String>,
}

/// Whether a URL plausibly points at a sitemap XML document.
pub fn looks_like_sitemap_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("sitemap") && (lower.contains(".xml") || lower.ends_with("/sitemap"))
}

/// A parsed sitemap document: either an index of further sitemaps or a
/// urlset of page URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>` with nested sitemap locations
    Index(Vec<String>),
    /// `<urlset>` with page locations
    UrlSet(Vec<String>),
}

/// Parse a sitemap document.
///
/// Accepts both the sitemaps.org namespace and namespace-less documents;
/// matching is by local element name.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let doc =
        roxmltree::Document::parse(xml).map_err(|e| SitemapError::ParseFailed(e.to_string()))?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "sitemapindex" => Ok(SitemapDocument::Index(collect_locs(&doc, "sitemap"))),
        "urlset" => Ok(SitemapDocument::UrlSet(collect_locs(&doc, "url"))),
        other => Err(SitemapError::ParseFailed(format!(
            "unexpected root element <{}>",
            other
        ))
        .into()),
    }
}

fn collect_locs(doc: &roxmltree::Document<'_>, parent: &str) -> Vec<String> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "loc")
        .filter(|n| {
            n.parent()
                .map(|p| p.is_element() && p.tag_name().name() == parent)
                .unwrap_or(false)
        })
        .filter_map(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Fetches sitemaps over HTTP and expands indexes into page URL lists.
pub struct SitemapFetcher {
    client: reqwest::Client,
}

impl SitemapFetcher {
    /// Create a fetcher with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SitemapError::FetchFailed(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create a fetcher with the default 30 s timeout.
    pub fn with_defaults() -> Result<Self> {
        Self::new(Duration::from_secs(30))
    }

    /// Fetch a sitemap and return every page URL it (transitively) lists.
    ///
    /// Index documents are expanded breadth-first; a visited set guards
    /// against self-referencing indexes. Individual fetch/parse failures
    /// are logged and contribute nothing.
    #[instrument(skip(self))]
    pub async fn fetch_urls(&self, sitemap_url: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut urls = Vec::new();
        queue.push_back(sitemap_url.to_string());

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            let body = match self.fetch_one(&current).await {
                Ok(body) => body,
                Err(e) => {
                    error!("Failed to fetch sitemap {}: {}", current, e);
                    continue;
                }
            };

            match parse_sitemap(&body) {
                Ok(SitemapDocument::Index(subs)) => {
                    info!("Sitemap index with {} sub-sitemaps: {}", subs.len(), current);
                    queue.extend(subs);
                }
                Ok(SitemapDocument::UrlSet(mut page_urls)) => {
                    info!("Extracted {} URLs from {}", page_urls.len(), current);
                    urls.append(&mut page_urls);
                }
                Err(e) => {
                    error!("Failed to parse sitemap {}: {}", current, e);
                }
            }
        }

        urls
    }

    async fn fetch_one(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SitemapError::FetchFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| SitemapError::FetchFailed(e.to_string()))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !content_type.contains("xml") && !content_type.contains("text") {
            return Err(SitemapError::NotXml(content_type).into());
        }

        response
            .text()
            .await
            .map_err(|e| SitemapError::FetchFailed(e.to_string()))
            .map_err(Into::into)
    }

    /// Process a urls file: one sitemap URL per line, grouped by domain.
    ///
    /// Non-sitemap-looking lines are skipped with a warning. An empty
    /// result is not an error here; the caller decides whether zero URLs
    /// is fatal.
    #[instrument(skip(self))]
    pub async fn process_urls_file(&self, path: &Path) -> Result<Vec<DomainPages>> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SitemapError::UrlsFile(format!("{}: {}", path.display(), e)))?;

        let mut discovered: Vec<(String, Vec<String>)> = Vec::new();
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !looks_like_sitemap_url(line) {
                warn!("URL does not look like a sitemap, skipping: {}", line);
                continue;
            }

            let page_urls = self.fetch_urls(line).await;
            if page_urls.is_empty() {
                continue;
            }

            let domain = extract_domain(line).unwrap_or_else(|| line.to_string());
            discovered.push((domain, page_urls));
        }

        Ok(group_by_domain(discovered))
    }
}

/// Extract the host from a URL.
pub fn extract_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Group (domain, urls) pairs, deduplicating each domain's URLs while
/// preserving first-seen order of both domains and URLs.
fn group_by_domain(discovered: Vec<(String, Vec<String>)>) -> Vec<DomainPages> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, (HashSet<String>, Vec<String>)> = HashMap::new();

    for (domain, urls) in discovered {
        if !grouped.contains_key(&domain) {
            order.push(domain.clone());
        }
        let (seen, kept) = grouped.entry(domain).or_default();
        for url in urls {
            if seen.insert(url.clone()) {
                kept.push(url);
            }
        }
    }

    order
        .into_iter()
        .map(|domain| {
            let (_, urls) = grouped.remove(&domain).unwrap_or_default();
            DomainPages { domain, urls }
        })
        .collect()
}
