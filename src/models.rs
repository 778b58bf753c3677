//! Shared data model for crawl records, frontier entries, extracted links,
//! and the serialized checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Priority assigned to the start URL.
pub const PRIORITY_START: i64 = 10;
/// Priority for sitemap- or robots-derived URLs.
pub const PRIORITY_SITEMAP: i64 = 8;
/// Priority for high-value path patterns (blog, article, news, ...).
pub const PRIORITY_HIGH_VALUE: i64 = 7;
/// Priority for language variants, pagination, and feed URLs.
pub const PRIORITY_BOOSTED: i64 = 6;
/// Priority for a generic internal link.
pub const PRIORITY_DEFAULT: i64 = 5;

/// Terminal and non-terminal states of a crawl record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Queued => "queued",
            CrawlStatus::Processing => "processing",
            CrawlStatus::Completed => "completed",
            CrawlStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(CrawlStatus::Queued),
            "processing" => Some(CrawlStatus::Processing),
            "completed" => Some(CrawlStatus::Completed),
            "failed" => Some(CrawlStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlStatus::Completed | CrawlStatus::Failed)
    }
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External status surface for one crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub crawl_id: i64,
    pub base_domain: String,
    pub status: CrawlStatus,
    pub max_depth: u32,
    pub pages_crawled: u64,
    pub external_links_total: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a frontier entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Start,
    Page,
    Sitemap,
    Robots,
    Pagination,
    Internal,
}

/// A URL awaiting fetch, with the priority fixed at admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
    pub source_url: String,
    pub kind: EntryKind,
    pub priority: i64,
}

impl FrontierEntry {
    pub fn start(url: String) -> Self {
        Self {
            url,
            depth: 0,
            source_url: "start".to_string(),
            kind: EntryKind::Start,
            priority: PRIORITY_START,
        }
    }
}

/// One extracted outbound link to a foreign registrable domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub source_url: String,
    pub target_url: String,
    pub target_domain: String,
    pub anchor_text: String,
    pub rel: Option<String>,
    pub is_nofollow: bool,
    pub observed_at: DateTime<Utc>,
}

/// Aggregated per-domain view of the outgoing links of one crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSummary {
    pub target_domain: String,
    pub link_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Serialized crawl state, written as a single blob keyed by base domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub discovered: Vec<String>,
    pub crawled: Vec<String>,
    pub frontier: Vec<FrontierEntry>,
    pub robots_cache: HashMap<String, String>,
    pub sitemap_cache: HashMap<String, Vec<String>>,
    pub saved_at_ms: u64,
}

/// rel-attribute filter for link queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelFilter {
    #[default]
    All,
    Nofollow,
    Dofollow,
}

impl RelFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(RelFilter::All),
            "nofollow" => Some(RelFilter::Nofollow),
            "dofollow" => Some(RelFilter::Dofollow),
            _ => None,
        }
    }
}

/// Paginated, filtered query over the outgoing-links table.
#[derive(Debug, Clone)]
pub struct LinkQuery {
    /// 1-based page index.
    pub page: u32,
    pub limit: u32,
    /// Substring match against anchor text or target URL.
    pub text_filter: Option<String>,
    pub rel: RelFilter,
    /// Exact match on target domain.
    pub domain_filter: Option<String>,
}

impl Default for LinkQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            text_filter: None,
            rel: RelFilter::All,
            domain_filter: None,
        }
    }
}

/// One stored outgoing-link row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRow {
    pub crawl_id: i64,
    pub source_url: String,
    pub target_url: String,
    pub target_domain: String,
    pub anchor_text: String,
    pub rel: Option<String>,
    pub is_nofollow: bool,
    pub observed_at: DateTime<Utc>,
}

/// A page of link rows plus the total row count for the filters.
#[derive(Debug, Clone)]
pub struct LinkPage {
    pub rows: Vec<LinkRow>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// Crawl record plus (for completed crawls) the outgoing-domain rollup.
#[derive(Debug, Clone)]
pub struct CrawlStatusView {
    pub record: CrawlRecord,
    pub outgoing_domains: Vec<DomainSummary>,
}

/// Returned by `start`: the identity of the scheduled crawl.
#[derive(Debug, Clone, Serialize)]
pub struct StartReceipt {
    pub crawl_id: i64,
    pub base_domain: String,
}

/// Terminal summary returned by the controller.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub crawl_id: i64,
    pub base_domain: String,
    pub status: CrawlStatus,
    pub pages_crawled: u64,
    pub external_links: u64,
    pub fetch_errors: u64,
    pub duration_secs: u64,
}

impl std::fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: {} pages, {} external links, {} errors in {}s",
            self.base_domain,
            self.status,
            self.pages_crawled,
            self.external_links,
            self.fetch_errors,
            self.duration_secs
        )
    }
}
