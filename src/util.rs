//! Shared helpers: name sanitization, timestamps, static-resource detection.

use std::path::{Path, PathBuf};

/// File extensions that identify non-HTML assets a sitemap sometimes lists.
const STATIC_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".svg", ".ico", ".webp", ".css", ".js", ".json",
    ".xml", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".zip", ".rar", ".tar", ".gz", ".mp3",
    ".mp4", ".avi", ".mov", ".wmv", ".woff", ".woff2", ".ttf", ".eot", ".otf",
];

/// Path segments that identify asset directories.
const STATIC_DIRS: &[&str] = &[
    "/wp-content/uploads/",
    "/images/",
    "/img/",
    "/css/",
    "/js/",
    "/assets/",
    "/static/",
    "/media/",
    "/fonts/",
    "/downloads/",
];

/// Returns true when the URL points at a static asset rather than a page.
///
/// Matching is done on the URL path only, so query strings never hide an
/// asset extension and a "wp-content" in the query never causes a false
/// positive.
pub fn is_static_resource(url: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        // Unparseable input falls back to matching against the raw string.
        Err(_) => url.to_lowercase(),
    };

    if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }
    STATIC_DIRS.iter().any(|dir| path.contains(dir))
}

/// Cleans a domain name for use as a directory name.
///
/// Strips a leading `www.`, lowercases, and replaces anything outside
/// `[a-z0-9.-]` with underscores.
pub fn clean_domain_name(domain: &str) -> String {
    let domain = domain.to_lowercase();
    let domain = domain.strip_prefix("www.").unwrap_or(&domain);

    domain
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derives a filesystem-safe page name from a URL.
///
/// Uses the last path segment, replacing anything outside `[a-zA-Z0-9]` with
/// underscores; falls back to `page_{index}` for the homepage or degenerate
/// segments.
pub fn page_file_name(url: &str, index: usize) -> String {
    static SANITIZER: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let sanitizer = SANITIZER.get_or_init(|| regex::Regex::new(r"[^a-zA-Z0-9]").expect("static regex"));

    let fallback = format!("page_{}", index + 1);
    let parsed = match url::Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return fallback,
    };
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or("");

    let name = sanitizer.replace_all(segment, "_").to_string();
    if name.is_empty() || name.chars().all(|c| c == '_') {
        fallback
    } else {
        name
    }
}

/// Finds a path under `dir` that does not collide with an existing file.
///
/// Appends `_1`, `_2`, ... to the stem until the name is free, mirroring how
/// duplicate sitemap slugs are kept apart.
pub fn unique_pdf_path(dir: &Path, stem: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.pdf"));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{counter}.pdf"));
        counter += 1;
    }
    candidate
}

/// Timestamp string for log file names (`YYYYmmdd_HHMMSS`).
pub fn create_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn static_resource_by_extension() {
        assert!(is_static_resource("https://example.com/logo.png"));
        assert!(is_static_resource("https://example.com/a/b/style.CSS"));
        assert!(is_static_resource("https://example.com/font.woff2"));
        assert!(!is_static_resource("https://example.com/about"));
        assert!(!is_static_resource("https://example.com/"));
    }

    #[test]
    fn static_resource_by_directory() {
        assert!(is_static_resource(
            "https://example.com/wp-content/uploads/x.jpg"
        ));
        assert!(is_static_resource("https://example.com/assets/page"));
        assert!(!is_static_resource("https://example.com/blog/assets-of-war"));
    }

    #[test]
    fn static_resource_ignores_query() {
        assert!(!is_static_resource("https://example.com/page?img=logo.png"));
    }

    #[test]
    fn clean_domain_strips_www_and_specials() {
        assert_eq!(clean_domain_name("www.Example.COM"), "example.com");
        assert_eq!(clean_domain_name("shop.example.com"), "shop.example.com");
        assert_eq!(clean_domain_name("ex:ample.com"), "ex_ample.com");
    }

    #[test]
    fn page_name_from_last_segment() {
        assert_eq!(page_file_name("https://example.com/about-us/", 0), "about_us");
        assert_eq!(
            page_file_name("https://example.com/blog/my-post", 3),
            "my_post"
        );
    }

    #[test]
    fn page_name_falls_back_for_homepage() {
        assert_eq!(page_file_name("https://example.com/", 0), "page_1");
        assert_eq!(page_file_name("https://example.com", 4), "page_5");
    }

    #[test]
    fn unique_path_increments() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_pdf_path(dir.path(), "about");
        assert_eq!(first, dir.path().join("about.pdf"));
        std::fs::write(&first, b"x").unwrap();
        let second = unique_pdf_path(dir.path(), "about");
        assert_eq!(second, dir.path().join("about_1.pdf"));
    }

    #[test]
    fn timestamp_shape() {
        let ts = create_timestamp();
        assert_eq!(ts.len(), 15);
        assert!(ts.contains('_'));
    }
}
