//! Control surface used by external layers (HTTP dashboard, CLI): start a
//! crawl, poll its status, query its extracted links.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::CrawlOptions;
use crate::crawler::{self, CrawlError};
use crate::models::{CrawlStatusView, CrawlSummary, LinkPage, LinkQuery, StartReceipt};
use crate::store::{LinkStore, StoreError};
use crate::url_utils;

pub struct Control {
    store: Arc<LinkStore>,
}

impl Control {
    pub fn new(store: Arc<LinkStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LinkStore> {
        &self.store
    }

    /// Validate the start URL, insert the crawl record, and schedule the
    /// crawl on a background task. Returns immediately; progress is
    /// observable through `status`. A validation failure creates no record.
    pub async fn start(
        &self,
        url: &str,
        options: CrawlOptions,
    ) -> Result<StartReceipt, CrawlError> {
        let (receipt, start_url) = self.prepare(url, &options).await?;
        let store = Arc::clone(&self.store);
        let crawl_id = receipt.crawl_id;
        let cancel = CancellationToken::new();

        tokio::spawn(async move {
            // Failures are surfaced through the status endpoint; the record
            // is already marked failed by the controller.
            if let Err(e) = crawler::run_crawl(store, start_url, options, crawl_id, cancel).await {
                tracing::error!(crawl_id, error = %e, "background crawl failed");
            }
        });

        Ok(receipt)
    }

    /// Run a crawl on the caller's task and wait for its terminal summary.
    pub async fn run(
        &self,
        url: &str,
        options: CrawlOptions,
        cancel: CancellationToken,
    ) -> Result<CrawlSummary, CrawlError> {
        let (receipt, start_url) = self.prepare(url, &options).await?;
        crawler::run_crawl(
            Arc::clone(&self.store),
            start_url,
            options,
            receipt.crawl_id,
            cancel,
        )
        .await
    }

    async fn prepare(
        &self,
        url: &str,
        options: &CrawlOptions,
    ) -> Result<(StartReceipt, Url), CrawlError> {
        let start_url = url_utils::validate_start_url(url).map_err(CrawlError::Validation)?;
        let base_domain = url_utils::base_domain(&start_url)
            .ok_or_else(|| CrawlError::Validation("start URL has no host".to_string()))?;

        let crawl_id = if options.resume {
            self.store
                .resume_crawl(&base_domain, options.max_depth)
                .await?
        } else {
            self.store
                .create_crawl(&base_domain, options.max_depth)
                .await?
        };

        Ok((
            StartReceipt {
                crawl_id,
                base_domain,
            },
            start_url,
        ))
    }

    /// Latest crawl record for a domain, with the outgoing-domain rollup
    /// once the crawl has completed.
    pub async fn status(&self, base_domain: &str) -> Result<Option<CrawlStatusView>, StoreError> {
        self.store
            .status_view(&base_domain.to_ascii_lowercase())
            .await
    }

    /// Paginated, filtered link rows from the latest crawl of a domain.
    pub async fn links(
        &self,
        base_domain: &str,
        query: &LinkQuery,
    ) -> Result<LinkPage, StoreError> {
        self.store
            .links(&base_domain.to_ascii_lowercase(), query)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        let store = Arc::new(LinkStore::in_memory().await.unwrap());
        let control = Control::new(Arc::clone(&store));

        let err = control
            .start("ftp://example.test/", CrawlOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Validation(_)));

        // No crawl record is created for a rejected URL.
        assert!(store.latest_crawl("example.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_garbage_urls() {
        let store = Arc::new(LinkStore::in_memory().await.unwrap());
        let control = Control::new(store);
        assert!(control
            .start("not a url at all", CrawlOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_status_of_unknown_domain_is_none() {
        let store = Arc::new(LinkStore::in_memory().await.unwrap());
        let control = Control::new(store);
        assert!(control.status("nowhere.test").await.unwrap().is_none());
    }
}
