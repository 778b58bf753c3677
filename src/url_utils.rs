//! URL canonicalization, the same-site scope predicate, and the path
//! classifiers that drive frontier priorities.

use crate::config::CrawlOptions;
use crate::models::{EntryKind, PRIORITY_BOOSTED, PRIORITY_DEFAULT, PRIORITY_HIGH_VALUE};
use regex::RegexSet;
use std::sync::LazyLock;
use url::Url;

/// Path substrings that mark a URL as high value for discovery.
const HIGH_VALUE_PATTERNS: &[&str] = &[
    "/blog/",
    "/article/",
    "/post/",
    "/news/",
    "/wiki/",
    "/page/",
    "/category/",
    "/tag/",
    "/archive/",
    "/search/",
    "/index",
    "/sitemap",
    "/directory/",
    "/list/",
    "/browse/",
];

static LANGUAGE_VARIANT: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"/[a-z]{2}/",
        r"/[a-z]{2}-[a-z]{2}/",
        r"\.[a-z]{2}\.",
        r"lang=",
        r"language=",
        r"locale=",
    ])
    .expect("invalid language-variant patterns")
});

static PAGINATION: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"page=\d+",
        r"p=\d+",
        r"offset=\d+",
        r"start=\d+",
        r"/page/\d+",
        r"/p\d+",
        r"/\d+/$",
        r"next",
        r"more",
        r"continue",
    ])
    .expect("invalid pagination patterns")
});

/// File extensions that are never worth fetching as pages.
const SKIPPED_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".zip",
    ".mp4", ".avi", ".mov", ".mp3", ".wav", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".tar", ".gz", ".tgz", ".bz2", ".7z", ".rar", ".exe", ".msi", ".dmg", ".iso", ".apk",
];

/// Resolve an href against its page URL and return the canonical absolute
/// form used for dedup. Non-HTTP(S) schemes, fragment-only references, and
/// pseudo-links (`javascript:`, `mailto:`, `tel:`, `data:`) are rejected.
pub fn canonicalize(href: &str, base: &Url) -> Option<Url> {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    for scheme in ["javascript:", "mailto:", "tel:", "data:", "file:"] {
        if lower.starts_with(scheme) {
            return None;
        }
    }

    let mut resolved = base.join(trimmed).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }

    // The fragment never reaches the server; drop it so dedup sees one URL.
    resolved.set_fragment(None);
    Some(resolved)
}

/// Lowercased host of a URL, the scope anchor for a crawl.
pub fn base_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_ascii_lowercase())
}

/// Same-site check. With subdomains enabled, `blog.example.test` is in
/// scope for base `example.test`; without, only the exact host matches.
pub fn in_scope(host: &str, base: &str, include_subdomains: bool) -> bool {
    let host = host.to_ascii_lowercase();
    if host == base {
        return true;
    }
    include_subdomains && host.ends_with(&format!(".{}", base))
}

/// Whether a URL matches one of the high-value path substrings.
pub fn is_high_value(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    HIGH_VALUE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Whether a URL looks like a language or locale variant.
pub fn is_language_variant(url: &str) -> bool {
    LANGUAGE_VARIANT.is_match(&url.to_ascii_lowercase())
}

/// Whether a URL looks like a pagination step.
pub fn is_pagination(url: &str) -> bool {
    PAGINATION.is_match(&url.to_ascii_lowercase())
}

/// Whether an href points at a feed.
pub fn is_feed(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("rss") || lower.contains("atom") || lower.contains("feed")
}

/// Classify an in-scope link into (priority, entry kind). Priorities are
/// fixed here at admission time and never recomputed.
pub fn classify(url: &str, opts: &CrawlOptions) -> (i64, EntryKind) {
    if is_high_value(url) {
        return (PRIORITY_HIGH_VALUE, EntryKind::Internal);
    }
    if opts.follow_pagination && is_pagination(url) {
        return (PRIORITY_BOOSTED, EntryKind::Pagination);
    }
    if opts.include_language_variants && is_language_variant(url) {
        return (PRIORITY_BOOSTED, EntryKind::Internal);
    }
    if is_feed(url) {
        return (PRIORITY_BOOSTED, EntryKind::Page);
    }
    (PRIORITY_DEFAULT, EntryKind::Internal)
}

/// Whether a URL is worth admitting to the frontier at all. Binary assets
/// are recorded as external links when foreign but never fetched as pages.
pub fn is_fetchable(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    !SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Whether a content type represents HTML.
pub fn is_html_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.contains("text/html") || lower.starts_with("application/xhtml+xml")
}

/// Validate a start URL: absolute, HTTP or HTTPS, with a host.
pub fn validate_start_url(raw: &str) -> Result<Url, String> {
    let parsed = Url::parse(raw).map_err(|e| format!("invalid URL: {}", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme: {}", parsed.scheme()));
    }
    if parsed.host_str().is_none() {
        return Err("URL has no host".to_string());
    }
    Ok(parsed)
}

/// Normalize CLI input by adding https:// when no scheme is provided.
pub fn normalize_url_for_cli(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    format!("https://{}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.test/dir/page").unwrap()
    }

    #[test]
    fn test_canonicalize_resolves_relative() {
        assert_eq!(
            canonicalize("/about", &base()).unwrap().as_str(),
            "https://example.test/about"
        );
        assert_eq!(
            canonicalize("sibling", &base()).unwrap().as_str(),
            "https://example.test/dir/sibling"
        );
    }

    #[test]
    fn test_canonicalize_rejects_pseudo_links() {
        assert!(canonicalize("#top", &base()).is_none());
        assert!(canonicalize("javascript:void(0)", &base()).is_none());
        assert!(canonicalize("mailto:a@b.test", &base()).is_none());
        assert!(canonicalize("tel:+15550100", &base()).is_none());
        assert!(canonicalize("ftp://example.test/file", &base()).is_none());
    }

    #[test]
    fn test_canonicalize_strips_fragment() {
        assert_eq!(
            canonicalize("/about#team", &base()).unwrap().as_str(),
            "https://example.test/about"
        );
    }

    #[test]
    fn test_canonicalize_preserves_query() {
        assert_eq!(
            canonicalize("/s?q=Rust&p=2", &base()).unwrap().as_str(),
            "https://example.test/s?q=Rust&p=2"
        );
    }

    #[test]
    fn test_in_scope_with_subdomains() {
        assert!(in_scope("example.test", "example.test", true));
        assert!(in_scope("blog.example.test", "example.test", true));
        assert!(in_scope("WWW.EXAMPLE.TEST", "example.test", true));
        assert!(!in_scope("other.test", "example.test", true));
        assert!(!in_scope("notexample.test", "example.test", true));
    }

    #[test]
    fn test_in_scope_strict() {
        assert!(in_scope("example.test", "example.test", false));
        assert!(!in_scope("blog.example.test", "example.test", false));
    }

    #[test]
    fn test_high_value_paths() {
        assert!(is_high_value("https://example.test/blog/post-1"));
        assert!(is_high_value("https://example.test/wiki/Rust"));
        assert!(is_high_value("https://example.test/index.html"));
        assert!(!is_high_value("https://example.test/pricing"));
    }

    #[test]
    fn test_language_variants() {
        assert!(is_language_variant("https://example.test/de/start"));
        assert!(is_language_variant("https://example.test/pt-br/start"));
        assert!(is_language_variant("https://example.test/?lang=fr"));
        assert!(!is_language_variant("https://example.test/pricing"));
    }

    #[test]
    fn test_pagination() {
        assert!(is_pagination("https://example.test/posts?page=3"));
        assert!(is_pagination("https://example.test/page/7"));
        assert!(is_pagination("https://example.test/archive/2024/"));
        assert!(is_pagination("https://example.test/posts/next"));
        assert!(!is_pagination("https://example.test/pricing"));
    }

    #[test]
    fn test_classify_priorities() {
        let opts = CrawlOptions::default();
        assert_eq!(classify("https://example.test/blog/a", &opts).0, 7);
        assert_eq!(
            classify("https://example.test/posts?page=2", &opts),
            (6, EntryKind::Pagination)
        );
        assert_eq!(classify("https://example.test/feed.rss", &opts).0, 6);
        assert_eq!(
            classify("https://example.test/pricing", &opts),
            (5, EntryKind::Internal)
        );
    }

    #[test]
    fn test_classify_respects_flags() {
        let opts = CrawlOptions {
            follow_pagination: false,
            include_language_variants: false,
            ..Default::default()
        };
        // Without the pagination boost this falls through to the default.
        assert_eq!(
            classify("https://example.test/items?offset=40", &opts),
            (5, EntryKind::Internal)
        );
    }

    #[test]
    fn test_is_fetchable() {
        assert!(is_fetchable(&Url::parse("https://example.test/page").unwrap()));
        assert!(!is_fetchable(&Url::parse("https://example.test/a.pdf").unwrap()));
        assert!(!is_fetchable(&Url::parse("https://example.test/img.PNG").unwrap()));
    }

    #[test]
    fn test_is_html_content_type() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("application/xhtml+xml"));
        assert!(!is_html_content_type("application/json"));
    }

    #[test]
    fn test_validate_start_url() {
        assert!(validate_start_url("https://example.test/").is_ok());
        assert!(validate_start_url("http://example.test/").is_ok());
        assert!(validate_start_url("ftp://example.test/").is_err());
        assert!(validate_start_url("not a url").is_err());
    }

    #[test]
    fn test_normalize_url_for_cli() {
        assert_eq!(normalize_url_for_cli("example.test"), "https://example.test");
        assert_eq!(
            normalize_url_for_cli("http://example.test"),
            "http://example.test"
        );
    }
}
