//! HTML link extraction: anchors, JSON-LD URL fields, and feed references.
//!
//! One pass over a fetched page produces both frontier candidates (in-scope
//! links) and external-link records (anchors pointing at foreign domains).

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::config::CrawlOptions;
use crate::models::{EntryKind, ExternalLink, FrontierEntry, PRIORITY_DEFAULT};
use crate::url_utils;

/// Anchor text is clipped to this many characters after normalization.
pub const MAX_ANCHOR_TEXT: usize = 500;

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("invalid anchor selector"));
static JSON_LD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("invalid json-ld selector")
});

/// Everything a single page contributes to the crawl.
#[derive(Debug, Default)]
pub struct ExtractedLinks {
    pub internal: Vec<FrontierEntry>,
    pub external: Vec<ExternalLink>,
}

/// Parse a page and split its links into frontier candidates and external
/// records. Malformed elements are skipped; the scan never fails.
pub fn extract_page(
    html: &str,
    page_url: &Url,
    base_domain: &str,
    depth: u32,
    opts: &CrawlOptions,
    observed_at: DateTime<Utc>,
) -> ExtractedLinks {
    let document = Html::parse_document(html);
    let mut out = ExtractedLinks::default();

    // Per-page dedup: one row per external target, one candidate per URL.
    let mut seen_internal: HashSet<String> = HashSet::new();
    let mut seen_external: HashSet<String> = HashSet::new();

    for element in document.select(&ANCHOR) {
        let href = match element.value().attr("href") {
            Some(h) => h,
            None => continue,
        };
        let resolved = match url_utils::canonicalize(href, page_url) {
            Some(u) => u,
            None => continue,
        };
        let host = match url_utils::base_domain(&resolved) {
            Some(h) => h,
            None => continue,
        };

        if url_utils::in_scope(&host, base_domain, opts.include_subdomains) {
            if !url_utils::is_fetchable(&resolved) {
                continue;
            }
            let url = resolved.to_string();
            if !seen_internal.insert(url.clone()) {
                continue;
            }
            let (priority, kind) = url_utils::classify(&url, opts);
            out.internal.push(FrontierEntry {
                url,
                depth: depth + 1,
                source_url: page_url.to_string(),
                kind,
                priority,
            });
        } else {
            let target_url = resolved.to_string();
            if !seen_external.insert(target_url.clone()) {
                continue;
            }
            let rel = element.value().attr("rel").map(|r| r.to_string());
            out.external.push(ExternalLink {
                source_url: page_url.to_string(),
                target_url,
                target_domain: host,
                anchor_text: normalize_anchor_text(&element.text().collect::<String>()),
                is_nofollow: rel.as_deref().map(is_nofollow).unwrap_or(false),
                rel,
                observed_at,
            });
        }
    }

    for element in document.select(&JSON_LD) {
        let raw = element.text().collect::<String>();
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            // Malformed JSON-LD is local to one block.
            Err(_) => continue,
        };
        collect_json_urls(&value, |candidate| {
            if !candidate.starts_with("http://") && !candidate.starts_with("https://") {
                return;
            }
            let resolved = match url_utils::canonicalize(candidate, page_url) {
                Some(u) => u,
                None => return,
            };
            let host = match url_utils::base_domain(&resolved) {
                Some(h) => h,
                None => return,
            };
            if !url_utils::in_scope(&host, base_domain, opts.include_subdomains) {
                return;
            }
            if !url_utils::is_fetchable(&resolved) {
                return;
            }
            let url = resolved.to_string();
            if seen_internal.insert(url.clone()) {
                out.internal.push(FrontierEntry {
                    url,
                    depth: depth + 1,
                    source_url: page_url.to_string(),
                    kind: EntryKind::Page,
                    priority: PRIORITY_DEFAULT,
                });
            }
        });
    }

    out
}

/// Strip to text, collapse runs of whitespace, trim, clip to 500 chars.
pub fn normalize_anchor_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_ANCHOR_TEXT).collect()
}

/// True iff the tokenized rel attribute contains `nofollow`.
pub fn is_nofollow(rel: &str) -> bool {
    rel.to_ascii_lowercase()
        .split_whitespace()
        .any(|token| token == "nofollow")
}

/// Walk every string leaf of a JSON value tree.
fn collect_json_urls<F: FnMut(&str)>(value: &serde_json::Value, mut visit: F) {
    fn walk<F: FnMut(&str)>(value: &serde_json::Value, visit: &mut F) {
        match value {
            serde_json::Value::String(s) => visit(s),
            serde_json::Value::Array(items) => {
                for item in items {
                    walk(item, visit);
                }
            }
            serde_json::Value::Object(map) => {
                for item in map.values() {
                    walk(item, visit);
                }
            }
            _ => {}
        }
    }
    walk(value, &mut visit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PRIORITY_BOOSTED;

    fn extract(html: &str) -> ExtractedLinks {
        let page_url = Url::parse("https://example.test/").unwrap();
        extract_page(
            html,
            &page_url,
            "example.test",
            0,
            &CrawlOptions::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_internal_and_external_split() {
        let links = extract(
            r#"<a href="/about">A</a><a href="https://other.test/x" rel="nofollow">X</a>"#,
        );

        assert_eq!(links.internal.len(), 1);
        assert_eq!(links.internal[0].url, "https://example.test/about");
        assert_eq!(links.internal[0].depth, 1);

        assert_eq!(links.external.len(), 1);
        let ext = &links.external[0];
        assert_eq!(ext.target_url, "https://other.test/x");
        assert_eq!(ext.target_domain, "other.test");
        assert_eq!(ext.anchor_text, "X");
        assert_eq!(ext.rel.as_deref(), Some("nofollow"));
        assert!(ext.is_nofollow);
    }

    #[test]
    fn test_subdomain_is_internal_not_external() {
        let links = extract(r#"<a href="https://blog.example.test/post">B</a>"#);
        assert_eq!(links.internal.len(), 1);
        assert!(links.external.is_empty());
    }

    #[test]
    fn test_external_dedup_within_page() {
        let links = extract(
            r#"<a href="https://other.test/x">one</a><a href="https://other.test/x">two</a>"#,
        );
        assert_eq!(links.external.len(), 1);
        assert_eq!(links.external[0].anchor_text, "one");
    }

    #[test]
    fn test_anchor_text_strips_tags_and_collapses() {
        let links =
            extract("<a href=\"https://other.test/\"> <b>Hello</b>\n\n  <i>world</i> </a>");
        assert_eq!(links.external[0].anchor_text, "Hello world");
    }

    #[test]
    fn test_anchor_text_truncated() {
        let long = "x".repeat(900);
        let html = format!(r#"<a href="https://other.test/">{}</a>"#, long);
        let links = extract(&html);
        assert_eq!(links.external[0].anchor_text.chars().count(), MAX_ANCHOR_TEXT);
    }

    #[test]
    fn test_nofollow_tokenization() {
        assert!(is_nofollow("nofollow"));
        assert!(is_nofollow("external NOFOLLOW sponsored"));
        assert!(!is_nofollow("nofollowish"));
        assert!(!is_nofollow("external"));
    }

    #[test]
    fn test_pseudo_links_skipped() {
        let links = extract(
            r##"<a href="javascript:void(0)">j</a><a href="mailto:a@b.test">m</a><a href="#top">t</a>"##,
        );
        assert!(links.internal.is_empty());
        assert!(links.external.is_empty());
    }

    #[test]
    fn test_feed_link_boosted() {
        let links = extract(r#"<a href="/feed.rss">rss</a>"#);
        assert_eq!(links.internal[0].priority, PRIORITY_BOOSTED);
        assert_eq!(links.internal[0].kind, EntryKind::Page);
    }

    #[test]
    fn test_json_ld_urls_admitted_in_scope_only() {
        let links = extract(
            r#"<script type="application/ld+json">
            {"@type":"Article","url":"https://example.test/story",
             "publisher":{"logo":"https://cdn.other.test/logo"},
             "items":["https://example.test/related", 42, null]}
            </script>"#,
        );
        let urls: Vec<&str> = links.internal.iter().map(|e| e.url.as_str()).collect();
        assert!(urls.contains(&"https://example.test/story"));
        assert!(urls.contains(&"https://example.test/related"));
        // Foreign JSON-LD URLs are neither admitted nor recorded as links.
        assert_eq!(links.internal.len(), 2);
        assert!(links.external.is_empty());
    }

    #[test]
    fn test_malformed_json_ld_is_skipped() {
        let links = extract(
            r#"<script type="application/ld+json">{not json</script>
               <a href="/ok">ok</a>"#,
        );
        assert_eq!(links.internal.len(), 1);
    }

    #[test]
    fn test_binary_targets_not_admitted() {
        let links = extract(r#"<a href="/brochure.pdf">pdf</a>"#);
        assert!(links.internal.is_empty());
    }

    #[test]
    fn test_emitted_in_source_order() {
        let links = extract(
            r#"<a href="https://a.test/1">1</a><a href="https://b.test/2">2</a><a href="https://c.test/3">3</a>"#,
        );
        let targets: Vec<&str> = links.external.iter().map(|e| e.target_url.as_str()).collect();
        assert_eq!(
            targets,
            vec!["https://a.test/1", "https://b.test/2", "https://c.test/3"]
        );
    }
}
