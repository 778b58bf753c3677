//! Sitemap discovery: candidate paths, robots.txt `Sitemap:` directives,
//! and recursive sitemap-index walking.
//!
//! robots.txt is consumed only to find sitemap locations; page-level allow
//! rules are out of scope for this crawler. All discovery fetches are
//! best-effort with retry and never fail the crawl.

use dashmap::DashMap;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::HashSet;
use std::io::Cursor;
use url::Url;

use crate::backoff::retry_discovery;
use crate::config::CrawlOptions;
use crate::frontier::Frontier;
use crate::models::{EntryKind, FrontierEntry, PRIORITY_SITEMAP};
use crate::network::{FetchError, HttpClient};
use crate::url_utils;

/// Paths probed when robots.txt declares no sitemaps.
const CANDIDATE_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemaps.xml",
    "/sitemap/sitemap.xml",
];

/// Borrowed view of the crawl state the discoverer needs.
pub struct Discovery<'a> {
    pub http: &'a HttpClient,
    pub frontier: &'a Frontier,
    pub options: &'a CrawlOptions,
    pub base_domain: &'a str,
    /// robots.txt URL -> body, carried across checkpoints.
    pub robots_cache: &'a DashMap<String, String>,
    /// sitemap URL -> extracted locs, memoizes the recursive walk.
    pub sitemap_cache: &'a DashMap<String, Vec<String>>,
}

/// Seed the frontier from sitemaps. Admits every terminal (non-XML) `<loc>`
/// at depth 1 and priority 8, subject to scope and the page cap.
pub async fn discover(d: &Discovery<'_>, start_url: &Url) {
    let origin = start_url.origin().ascii_serialization();

    // (sitemap url, entry kind for URLs it yields)
    let mut queue: Vec<(String, EntryKind)> = Vec::new();

    if d.options.follow_sitemaps {
        for path in CANDIDATE_PATHS {
            queue.push((format!("{}{}", origin, path), EntryKind::Sitemap));
        }
    }

    if d.options.respect_robots {
        for declared in robots_sitemaps(d, &origin).await {
            queue.push((declared, EntryKind::Robots));
        }
    }

    let mut visited: HashSet<String> = HashSet::new();
    while let Some((sitemap_url, kind)) = queue.pop() {
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }
        // Recursion is bounded by the frontier cap.
        if d.frontier.discovered_len() >= d.options.max_pages {
            tracing::debug!("page cap reached, stopping sitemap walk");
            break;
        }

        let locs = match sitemap_locs(d, &sitemap_url).await {
            Some(locs) => locs,
            None => continue,
        };

        for loc in locs {
            if is_nested_sitemap(&loc) {
                queue.push((loc, kind));
                continue;
            }
            admit_page(d, &loc, kind);
        }
    }
}

/// Fetch robots.txt (cached, retried) and return its `Sitemap:` lines.
async fn robots_sitemaps(d: &Discovery<'_>, origin: &str) -> Vec<String> {
    let robots_url = format!("{}/robots.txt", origin);

    let body = match d.robots_cache.get(&robots_url) {
        Some(cached) => cached.value().clone(),
        None => {
            match retry_discovery(|| d.http.fetch_text(&robots_url), FetchError::retryable).await {
                Ok(body) => {
                    d.robots_cache.insert(robots_url.clone(), body.clone());
                    body
                }
                Err(e) => {
                    tracing::debug!(url = %robots_url, error = %e, "robots.txt unavailable");
                    return Vec::new();
                }
            }
        }
    };

    parse_robots_sitemaps(&body)
}

/// Extract `Sitemap:` directive values from a robots.txt body.
pub fn parse_robots_sitemaps(robots_txt: &str) -> Vec<String> {
    robots_txt
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.len() >= 8 && line[..8].eq_ignore_ascii_case("sitemap:") {
                let value = line[8..].trim();
                if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            } else {
                None
            }
        })
        .collect()
}

/// Fetch and parse one sitemap, memoized in the sitemap cache.
async fn sitemap_locs(d: &Discovery<'_>, sitemap_url: &str) -> Option<Vec<String>> {
    if let Some(cached) = d.sitemap_cache.get(sitemap_url) {
        return Some(cached.value().clone());
    }

    let xml = match retry_discovery(|| d.http.fetch_text(sitemap_url), FetchError::retryable).await {
        Ok(xml) => xml,
        Err(e) => {
            tracing::debug!(url = %sitemap_url, error = %e, "sitemap fetch failed");
            return None;
        }
    };

    let locs = parse_sitemap_locs(&xml);
    tracing::debug!(url = %sitemap_url, locs = locs.len(), "parsed sitemap");
    d.sitemap_cache.insert(sitemap_url.to_string(), locs.clone());
    Some(locs)
}

/// Pull every `<loc>` out of a sitemap or sitemap-index document. Uses the
/// streaming reader first and falls back to a raw fragment scan so that
/// malformed XML still yields whatever locs it contains.
pub fn parse_sitemap_locs(xml: &str) -> Vec<String> {
    let mut locs = Vec::new();
    for entity in SiteMapReader::new(Cursor::new(xml.as_bytes())) {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    locs.push(url.to_string());
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    locs.push(url.to_string());
                }
            }
            _ => {}
        }
    }

    if locs.is_empty() {
        locs = scan_loc_fragments(xml);
    }
    locs
}

/// Last-resort `<loc>...</loc>` scan for documents the XML reader rejects.
fn scan_loc_fragments(xml: &str) -> Vec<String> {
    let mut locs = Vec::new();
    let mut rest = xml;
    while let Some(open) = rest.find("<loc>") {
        rest = &rest[open + 5..];
        let Some(close) = rest.find("</loc>") else {
            break;
        };
        let value = rest[..close].trim();
        if !value.is_empty() {
            locs.push(value.to_string());
        }
        rest = &rest[close + 6..];
    }
    locs
}

/// A loc pointing at another sitemap file rather than a page.
fn is_nested_sitemap(loc: &str) -> bool {
    let path_only = loc.split(['?', '#']).next().unwrap_or(loc);
    path_only.to_ascii_lowercase().ends_with(".xml")
}

fn admit_page(d: &Discovery<'_>, loc: &str, kind: EntryKind) {
    let parsed = match Url::parse(loc) {
        Ok(u) => u,
        Err(_) => return,
    };
    let Some(host) = url_utils::base_domain(&parsed) else {
        return;
    };
    if !url_utils::in_scope(&host, d.base_domain, d.options.include_subdomains) {
        return;
    }
    if !url_utils::is_fetchable(&parsed) {
        return;
    }

    let mut canonical = parsed;
    canonical.set_fragment(None);
    let source = match kind {
        EntryKind::Robots => "robots",
        _ => "sitemap",
    };
    d.frontier.admit(FrontierEntry {
        url: canonical.to_string(),
        depth: 1,
        source_url: source.to_string(),
        kind,
        priority: PRIORITY_SITEMAP,
    });
}
