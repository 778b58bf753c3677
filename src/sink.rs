//! Worker-local buffering of external-link rows.
//!
//! Each worker owns one sink; only the flush touches shared storage. A
//! failed flush is logged and skipped, never fatal to the crawl.

use std::sync::Arc;

use crate::config::Limits;
use crate::models::ExternalLink;
use crate::store::LinkStore;

pub struct LinkSink {
    store: Arc<LinkStore>,
    crawl_id: i64,
    batch: Vec<ExternalLink>,
    capacity: usize,
    inserted_total: u64,
}

impl LinkSink {
    pub fn new(store: Arc<LinkStore>, crawl_id: i64) -> Self {
        Self::with_capacity(store, crawl_id, Limits::LINK_BATCH_SIZE)
    }

    pub fn with_capacity(store: Arc<LinkStore>, crawl_id: i64, capacity: usize) -> Self {
        Self {
            store,
            crawl_id,
            batch: Vec::with_capacity(capacity),
            capacity,
            inserted_total: 0,
        }
    }

    /// Buffer one record, flushing when the batch is full. Returns the
    /// number of rows inserted by a triggered flush (0 when buffered).
    pub async fn push(&mut self, link: ExternalLink) -> u64 {
        self.batch.push(link);
        if self.batch.len() >= self.capacity {
            self.flush().await
        } else {
            0
        }
    }

    /// Append the buffered rows and the per-domain rollup, then clear the
    /// batch. Returns the number of rows inserted.
    pub async fn flush(&mut self) -> u64 {
        if self.batch.is_empty() {
            return 0;
        }

        let batch = std::mem::take(&mut self.batch);
        match self.store.append_links(self.crawl_id, &batch).await {
            Ok(inserted) => {
                self.inserted_total += inserted;
                inserted
            }
            Err(e) => {
                tracing::warn!(crawl_id = self.crawl_id, rows = batch.len(), error = %e,
                    "link batch flush failed, dropping batch");
                0
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Rows actually inserted over the sink's lifetime.
    pub fn inserted_total(&self) -> u64 {
        self.inserted_total
    }
}
