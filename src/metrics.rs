//! Atomic counters shared by the worker pool.

use std::sync::atomic::{AtomicU64, Ordering};

/// Crawl-wide progress counters. All methods are lock-free; values are
/// approximate while workers are running and exact after drain.
#[derive(Debug, Default)]
pub struct CrawlMetrics {
    pages_crawled: AtomicU64,
    fetch_errors: AtomicU64,
    external_links: AtomicU64,
    frontier_admitted: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub pages_crawled: u64,
    pub fetch_errors: u64,
    pub external_links: u64,
    pub frontier_admitted: u64,
}

impl CrawlMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed page and return the running total.
    pub fn page_crawled(&self) -> u64 {
        self.pages_crawled.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn external_links_flushed(&self, count: u64) {
        self.external_links.fetch_add(count, Ordering::Relaxed);
    }

    pub fn frontier_admissions(&self, count: u64) {
        self.frontier_admitted.fetch_add(count, Ordering::Relaxed);
    }

    /// Seed the page counter when resuming from a checkpoint.
    pub fn set_pages_crawled(&self, value: u64) {
        self.pages_crawled.store(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_crawled: self.pages_crawled.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            external_links: self.external_links.load(Ordering::Relaxed),
            frontier_admitted: self.frontier_admitted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pages, {} external links, {} errors, {} admitted",
            self.pages_crawled, self.external_links, self.fetch_errors, self.frontier_admitted
        )
    }
}
