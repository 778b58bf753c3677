pub mod backoff;
pub mod cli;
pub mod config;
pub mod control;
pub mod crawler;
pub mod extract;
pub mod frontier;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod network;
pub mod sink;
pub mod sitemaps;
pub mod store;
pub mod url_utils;

// Re-export main types for library usage
pub use config::CrawlOptions;
pub use control::Control;
pub use crawler::{run_crawl, CrawlContext, CrawlError};
pub use frontier::Frontier;
pub use models::{
    Checkpoint, CrawlRecord, CrawlStatus, CrawlSummary, DomainSummary, EntryKind, ExternalLink,
    FrontierEntry, LinkPage, LinkQuery, RelFilter, StartReceipt,
};
pub use network::{FetchError, FetchedPage, HttpClient};
pub use sink::LinkSink;
pub use store::{LinkStore, StoreError};
