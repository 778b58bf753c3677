//! The crawl engine: shared state, the worker pool, and the controller
//! that drives one crawl from seed to terminal status.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{CrawlOptions, Limits};
use crate::extract;
use crate::frontier::Frontier;
use crate::metrics::CrawlMetrics;
use crate::models::{Checkpoint, CrawlStatus, CrawlSummary, FrontierEntry};
use crate::network::{FetchError, HttpClient};
use crate::sink::LinkSink;
use crate::sitemaps::{self, Discovery};
use crate::store::{LinkStore, StoreError};
use crate::url_utils;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("invalid start URL: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Client(#[from] FetchError),

    #[error("worker failure: {0}")]
    Worker(String),
}

/// State shared by every worker of one crawl.
pub struct CrawlContext {
    pub crawl_id: i64,
    pub base_domain: String,
    pub options: CrawlOptions,
    pub frontier: Frontier,
    /// Final URLs already fetched this crawl; prevents re-entry.
    pub crawled: DashMap<String, ()>,
    pub robots_cache: DashMap<String, String>,
    pub sitemap_cache: DashMap<String, Vec<String>>,
    pub metrics: CrawlMetrics,
    pub http: HttpClient,
    pub store: Arc<LinkStore>,
    pub cancel: CancellationToken,
    /// Serializes checkpoint saves; at most one save runs at a time.
    checkpoint_gate: tokio::sync::Mutex<()>,
}

impl CrawlContext {
    fn new(
        crawl_id: i64,
        base_domain: String,
        options: CrawlOptions,
        store: Arc<LinkStore>,
        cancel: CancellationToken,
    ) -> Result<Self, CrawlError> {
        let http = HttpClient::new(&options.user_agent)?;
        Ok(Self {
            crawl_id,
            base_domain,
            frontier: Frontier::new(options.max_pages),
            options,
            crawled: DashMap::new(),
            robots_cache: DashMap::new(),
            sitemap_cache: DashMap::new(),
            metrics: CrawlMetrics::new(),
            http,
            store,
            cancel,
            checkpoint_gate: tokio::sync::Mutex::new(()),
        })
    }

    fn build_checkpoint(&self) -> Checkpoint {
        let (discovered, frontier) = self.frontier.snapshot();
        Checkpoint {
            discovered,
            crawled: self.crawled.iter().map(|e| e.key().clone()).collect(),
            frontier,
            robots_cache: self
                .robots_cache
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            sitemap_cache: self
                .sitemap_cache
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            saved_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Snapshot the crawl state and upsert it. Failures are logged and
    /// never fatal.
    pub async fn save_checkpoint(&self) {
        let _gate = self.checkpoint_gate.lock().await;
        let checkpoint = self.build_checkpoint();
        if let Err(e) = self
            .store
            .save_checkpoint(&self.base_domain, &checkpoint)
            .await
        {
            tracing::warn!(domain = %self.base_domain, error = %e, "checkpoint save failed");
        }
    }

    fn restore(&self, checkpoint: Checkpoint) {
        self.metrics
            .set_pages_crawled(checkpoint.crawled.len() as u64);
        for url in &checkpoint.crawled {
            self.crawled.insert(url.clone(), ());
        }
        for (key, value) in checkpoint.robots_cache {
            self.robots_cache.insert(key, value);
        }
        for (key, value) in checkpoint.sitemap_cache {
            self.sitemap_cache.insert(key, value);
        }
        self.frontier
            .restore(checkpoint.discovered, checkpoint.frontier);
    }

    /// Best-effort push of running counters onto the crawl record.
    async fn push_counters(&self) {
        let snap = self.metrics.snapshot();
        if let Err(e) = self
            .store
            .update_counters(self.crawl_id, snap.pages_crawled, snap.external_links)
            .await
        {
            tracing::warn!(crawl_id = self.crawl_id, error = %e, "counter update failed");
        }
    }
}

/// Run one crawl to its terminal status. The crawl record identified by
/// `crawl_id` must already exist in `processing` state.
#[tracing::instrument(skip_all, fields(url = %start_url, crawl_id))]
pub async fn run_crawl(
    store: Arc<LinkStore>,
    start_url: Url,
    options: CrawlOptions,
    crawl_id: i64,
    cancel: CancellationToken,
) -> Result<CrawlSummary, CrawlError> {
    let started = Instant::now();
    let options = options.clamped();
    let base_domain = url_utils::base_domain(&start_url)
        .ok_or_else(|| CrawlError::Validation("start URL has no host".to_string()))?;

    let ctx = match CrawlContext::new(
        crawl_id,
        base_domain.clone(),
        options,
        Arc::clone(&store),
        cancel,
    ) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            let _ = store.finish_crawl(crawl_id, CrawlStatus::Failed, 0, 0).await;
            return Err(e);
        }
    };

    match drive(Arc::clone(&ctx), &start_url).await {
        Ok(()) => {
            ctx.save_checkpoint().await;
            let snap = ctx.metrics.snapshot();
            let cancelled = ctx.cancel.is_cancelled();
            let status = if cancelled {
                // Leave the record in `processing` so a later resume
                // continues this crawl.
                ctx.push_counters().await;
                CrawlStatus::Processing
            } else {
                store
                    .finish_crawl(
                        crawl_id,
                        CrawlStatus::Completed,
                        snap.pages_crawled,
                        snap.external_links,
                    )
                    .await?;
                CrawlStatus::Completed
            };

            let summary = CrawlSummary {
                crawl_id,
                base_domain,
                status,
                pages_crawled: snap.pages_crawled,
                external_links: snap.external_links,
                fetch_errors: snap.fetch_errors,
                duration_secs: started.elapsed().as_secs(),
            };
            tracing::info!(%summary, "crawl finished");
            Ok(summary)
        }
        Err(e) => {
            tracing::error!(error = %e, "crawl failed");
            ctx.save_checkpoint().await;
            let snap = ctx.metrics.snapshot();
            let _ = store
                .finish_crawl(
                    crawl_id,
                    CrawlStatus::Failed,
                    snap.pages_crawled,
                    snap.external_links,
                )
                .await;
            Err(e)
        }
    }
}

/// Seed (or resume) the frontier, then run workers until drain.
async fn drive(ctx: Arc<CrawlContext>, start_url: &Url) -> Result<(), CrawlError> {
    let mut seeded_from_checkpoint = false;

    if ctx.options.resume {
        match ctx.store.load_checkpoint(&ctx.base_domain).await {
            Ok(Some(checkpoint)) => {
                tracing::info!(
                    domain = %ctx.base_domain,
                    crawled = checkpoint.crawled.len(),
                    pending = checkpoint.frontier.len(),
                    "resuming from checkpoint"
                );
                ctx.restore(checkpoint);
                // Link rows persisted before the interruption stay counted.
                match ctx.store.count_links(ctx.crawl_id).await {
                    Ok(count) => ctx.metrics.external_links_flushed(count),
                    Err(e) => tracing::warn!(error = %e, "could not count persisted links"),
                }
                seeded_from_checkpoint = !ctx.frontier.is_empty();
            }
            Ok(None) => {
                tracing::info!(domain = %ctx.base_domain, "no checkpoint found, seeding fresh");
            }
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint load failed, seeding fresh");
            }
        }
    }

    if !seeded_from_checkpoint {
        ctx.frontier
            .admit(FrontierEntry::start(start_url.to_string()));

        if ctx.options.follow_sitemaps || ctx.options.respect_robots {
            let discovery = Discovery {
                http: &ctx.http,
                frontier: &ctx.frontier,
                options: &ctx.options,
                base_domain: &ctx.base_domain,
                robots_cache: &ctx.robots_cache,
                sitemap_cache: &ctx.sitemap_cache,
            };
            sitemaps::discover(&discovery, start_url).await;
        }
        tracing::info!(
            queued = ctx.frontier.len(),
            "frontier seeded"
        );
    }

    let mut workers = JoinSet::new();
    for worker_id in 0..ctx.options.concurrency {
        workers.spawn(worker_loop(Arc::clone(&ctx), worker_id));
    }

    let mut progress = tokio::time::interval(Duration::from_secs(10));
    progress.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            joined = workers.join_next() => {
                match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        // A panicking worker is an unhandled error in the
                        // pool; stop the rest and fail the crawl.
                        ctx.cancel.cancel();
                        while workers.join_next().await.is_some() {}
                        return Err(CrawlError::Worker(e.to_string()));
                    }
                }
            }
            _ = progress.tick() => {
                tracing::info!(
                    frontier = ctx.frontier.len(),
                    progress = %ctx.metrics.snapshot(),
                    "crawl progress"
                );
            }
        }
    }

    Ok(())
}

/// One cooperative worker: pop, fetch, extract, batch, repeat until the
/// frontier stays empty across the drain wait.
async fn worker_loop(ctx: Arc<CrawlContext>, worker_id: usize) {
    let mut sink = LinkSink::new(Arc::clone(&ctx.store), ctx.crawl_id);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let entry = match ctx.frontier.pop() {
            Some(entry) => entry,
            None => {
                // Wait briefly and re-check before declaring drain;
                // another worker may still be producing links.
                tokio::select! {
                    _ = sleep(Duration::from_millis(Limits::EMPTY_FRONTIER_WAIT_MS)) => {}
                    _ = ctx.cancel.cancelled() => break,
                }
                match ctx.frontier.pop() {
                    Some(entry) => entry,
                    None => break,
                }
            }
        };

        if ctx.crawled.contains_key(&entry.url) {
            continue;
        }
        if entry.depth > ctx.options.max_depth {
            continue;
        }

        match ctx.http.fetch_page(&entry.url).await {
            Err(e) => {
                ctx.metrics.fetch_error();
                tracing::debug!(worker_id, url = %entry.url, error = %e, "fetch failed");
            }
            Ok(page) => {
                // Dedup on the post-redirect URL: a second entry landing on
                // the same final URL is dropped here.
                let first_visit = ctx
                    .crawled
                    .insert(page.final_url.to_string(), ())
                    .is_none();
                if first_visit {
                    process_page(&ctx, &mut sink, &entry, &page).await;
                }
            }
        }

        tokio::select! {
            _ = sleep(Duration::from_millis(ctx.options.crawl_delay_ms)) => {}
            _ = ctx.cancel.cancelled() => break,
        }
    }

    let flushed = sink.flush().await;
    if flushed > 0 {
        ctx.metrics.external_links_flushed(flushed);
    }
    tracing::debug!(worker_id, "worker exiting");
}

async fn process_page(
    ctx: &CrawlContext,
    sink: &mut LinkSink,
    entry: &FrontierEntry,
    page: &crate::network::FetchedPage,
) {
    let pages = ctx.metrics.page_crawled();

    if let Some(body) = &page.body {
        let extracted = extract::extract_page(
            body,
            &page.final_url,
            &ctx.base_domain,
            entry.depth,
            &ctx.options,
            Utc::now(),
        );

        let mut admitted = 0u64;
        for candidate in extracted.internal {
            if ctx.frontier.admit(candidate) {
                admitted += 1;
            }
        }
        if admitted > 0 {
            ctx.metrics.frontier_admissions(admitted);
        }

        for link in extracted.external {
            let flushed = sink.push(link).await;
            if flushed > 0 {
                ctx.metrics.external_links_flushed(flushed);
            }
        }
    }

    if pages % Limits::COUNTER_INTERVAL == 0 {
        ctx.push_counters().await;
    }
    if pages % Limits::CHECKPOINT_INTERVAL == 0 {
        ctx.save_checkpoint().await;
    }
}
