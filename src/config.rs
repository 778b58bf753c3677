use serde::{Deserialize, Serialize};

/// Hard cap on `max_pages` regardless of what the caller requests.
pub const MAX_PAGES_CEILING: usize = 10_000;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "OutlinksCrawler/1.0 (+https://github.com/outlinks)";

/// Start-time options for a single crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOptions {
    /// Frontier admission bound.
    pub max_pages: usize,
    /// Entries deeper than this are skipped at pop.
    pub max_depth: u32,
    /// Worker pool size.
    pub concurrency: usize,
    /// Treat subdomains of the base domain as in scope.
    pub include_subdomains: bool,
    /// Run sitemap discovery at seed time.
    pub follow_sitemaps: bool,
    /// Consume robots.txt for `Sitemap:` hints.
    pub respect_robots: bool,
    /// Boost language-variant URLs.
    pub include_language_variants: bool,
    /// Boost pagination URLs.
    pub follow_pagination: bool,
    /// Per-worker sleep between fetches, in milliseconds.
    pub crawl_delay_ms: u64,
    /// HTTP User-Agent header.
    pub user_agent: String,
    /// Load an existing checkpoint instead of re-seeding.
    pub resume: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 5_000,
            max_depth: 10,
            concurrency: 5,
            include_subdomains: true,
            follow_sitemaps: true,
            respect_robots: true,
            include_language_variants: true,
            follow_pagination: true,
            crawl_delay_ms: 300,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            resume: false,
        }
    }
}

impl CrawlOptions {
    /// Clamp caller-supplied values into their allowed ranges.
    pub fn clamped(mut self) -> Self {
        self.max_pages = self.max_pages.min(MAX_PAGES_CEILING).max(1);
        self.concurrency = self.concurrency.max(1);
        self
    }
}

/// Internal tunables that are not part of the start-time surface.
pub struct Limits;

impl Limits {
    /// Rows buffered per worker before the sink flushes.
    pub const LINK_BATCH_SIZE: usize = 20;
    /// Checkpoint every N pages crawled.
    pub const CHECKPOINT_INTERVAL: u64 = 20;
    /// Push crawl-record counters every N pages crawled.
    pub const COUNTER_INTERVAL: u64 = 10;
    /// How long a worker waits on an empty frontier before re-checking.
    pub const EMPTY_FRONTIER_WAIT_MS: u64 = 1_000;
    /// Per-request hard timeout.
    pub const FETCH_TIMEOUT_SECS: u64 = 30;
    /// Retry budget for sitemap and robots fetches.
    pub const DISCOVERY_RETRIES: u32 = 3;
    /// Initial backoff delay for discovery retries.
    pub const DISCOVERY_BACKOFF_MS: u64 = 500;
    /// Upper bound on a buffered response body.
    pub const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024;
    /// Connection pool sizing for the HTTP client.
    pub const POOL_IDLE_PER_HOST: usize = 16;
    pub const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
}
