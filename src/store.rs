//! SQLite-backed persistence: crawl records, the append-only outgoing-links
//! sink tables, the per-domain rollup, and checkpoint blobs.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::models::{
    Checkpoint, CrawlRecord, CrawlStatus, CrawlStatusView, DomainSummary, ExternalLink, LinkPage,
    LinkQuery, LinkRow, RelFilter,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Decode(String),
}

/// Process-wide handle to the crawl database. Clone freely; all clones
/// share one connection pool.
#[derive(Debug, Clone)]
pub struct LinkStore {
    pool: SqlitePool,
}

impl LinkStore {
    /// Open (or create) a file-backed store and run migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Database)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS domains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                base_domain TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                pages_crawled INTEGER NOT NULL DEFAULT 0,
                external_links_total INTEGER NOT NULL DEFAULT 0,
                max_depth INTEGER NOT NULL DEFAULT 10,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS outgoing_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_id INTEGER NOT NULL,
                source_url TEXT NOT NULL,
                target_url TEXT NOT NULL,
                target_domain TEXT NOT NULL,
                anchor_text TEXT NOT NULL DEFAULT '',
                rel TEXT,
                is_nofollow INTEGER NOT NULL DEFAULT 0,
                observed_at TEXT NOT NULL,
                UNIQUE(crawl_id, source_url, target_url)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_outgoing_links_domain
                ON outgoing_links(crawl_id, target_domain)",
            r#"
            CREATE TABLE IF NOT EXISTS outgoing_domains (
                crawl_id INTEGER NOT NULL,
                target_domain TEXT NOT NULL,
                link_count INTEGER NOT NULL DEFAULT 0,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                UNIQUE(crawl_id, target_domain)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS crawl_states (
                base_domain TEXT PRIMARY KEY,
                state_blob TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )
            "#,
        ];

        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert the crawl record for a new crawl of `base_domain`, replacing
    /// any previous record for the domain and minting a fresh crawl id.
    /// Historical link rows keep the id of the crawl that produced them.
    pub async fn create_crawl(
        &self,
        base_domain: &str,
        max_depth: u32,
    ) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO domains
                (base_domain, status, pages_crawled, external_links_total,
                 max_depth, created_at, updated_at)
            VALUES (?, ?, 0, 0, ?, ?, ?)
            "#,
        )
        .bind(base_domain)
        .bind(CrawlStatus::Processing.as_str())
        .bind(max_depth as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Reuse the open (non-terminal) crawl of a domain when resuming after
    /// an interruption, so link-row uniqueness keeps working across the
    /// restart. Terminal crawls are never re-used; a fresh id is minted.
    pub async fn resume_crawl(
        &self,
        base_domain: &str,
        max_depth: u32,
    ) -> Result<i64, StoreError> {
        if let Some(record) = self.latest_crawl(base_domain).await? {
            if !record.status.is_terminal() {
                sqlx::query(
                    "UPDATE domains SET status = ?, max_depth = ?, updated_at = ? WHERE id = ?",
                )
                .bind(CrawlStatus::Processing.as_str())
                .bind(max_depth as i64)
                .bind(Utc::now().to_rfc3339())
                .bind(record.crawl_id)
                .execute(&self.pool)
                .await?;
                return Ok(record.crawl_id);
            }
        }
        self.create_crawl(base_domain, max_depth).await
    }

    /// Push running counters onto the crawl record.
    pub async fn update_counters(
        &self,
        crawl_id: i64,
        pages_crawled: u64,
        external_links_total: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE domains SET pages_crawled = ?, external_links_total = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(pages_crawled as i64)
        .bind(external_links_total as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(crawl_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write the terminal status plus final counters.
    pub async fn finish_crawl(
        &self,
        crawl_id: i64,
        status: CrawlStatus,
        pages_crawled: u64,
        external_links_total: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE domains
             SET status = ?, pages_crawled = ?, external_links_total = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(pages_crawled as i64)
        .bind(external_links_total as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(crawl_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent crawl record for a domain, if any.
    pub async fn latest_crawl(&self, base_domain: &str) -> Result<Option<CrawlRecord>, StoreError> {
        let row = sqlx::query_as::<_, DomainRow>(
            "SELECT id, base_domain, status, pages_crawled, external_links_total,
                    max_depth, created_at, updated_at
             FROM domains WHERE base_domain = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(base_domain)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DomainRow::into_record).transpose()
    }

    /// Append a batch of external-link rows. Duplicate rows (same crawl,
    /// source, target) are discarded at insert; the per-domain rollup is
    /// incremented only by the rows that actually landed. Returns the
    /// number of inserted rows.
    pub async fn append_links(
        &self,
        crawl_id: i64,
        batch: &[ExternalLink],
    ) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        // domain -> (inserted rows, earliest observation, latest observation)
        let mut per_domain: BTreeMap<&str, (u64, DateTime<Utc>, DateTime<Utc>)> = BTreeMap::new();
        let mut inserted_total = 0u64;

        for link in batch {
            let result = sqlx::query(
                r#"
                INSERT INTO outgoing_links
                    (crawl_id, source_url, target_url, target_domain,
                     anchor_text, rel, is_nofollow, observed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(crawl_id, source_url, target_url) DO NOTHING
                "#,
            )
            .bind(crawl_id)
            .bind(&link.source_url)
            .bind(&link.target_url)
            .bind(&link.target_domain)
            .bind(&link.anchor_text)
            .bind(&link.rel)
            .bind(link.is_nofollow)
            .bind(link.observed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted_total += 1;
                let slot = per_domain
                    .entry(link.target_domain.as_str())
                    .or_insert((0, link.observed_at, link.observed_at));
                slot.0 += 1;
                slot.1 = slot.1.min(link.observed_at);
                slot.2 = slot.2.max(link.observed_at);
            }
        }

        for (domain, (count, first_seen, last_seen)) in per_domain {
            sqlx::query(
                r#"
                INSERT INTO outgoing_domains
                    (crawl_id, target_domain, link_count, first_seen_at, last_seen_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(crawl_id, target_domain) DO UPDATE SET
                    link_count = link_count + excluded.link_count,
                    last_seen_at = excluded.last_seen_at
                "#,
            )
            .bind(crawl_id)
            .bind(domain)
            .bind(count as i64)
            .bind(first_seen.to_rfc3339())
            .bind(last_seen.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted_total)
    }

    /// Upsert the serialized crawl state for a domain. The row-level upsert
    /// is the serialization point for concurrent save attempts.
    pub async fn save_checkpoint(
        &self,
        base_domain: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let blob = serde_json::to_string(checkpoint)?;
        sqlx::query(
            r#"
            INSERT INTO crawl_states (base_domain, state_blob, saved_at)
            VALUES (?, ?, ?)
            ON CONFLICT(base_domain) DO UPDATE SET
                state_blob = excluded.state_blob,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(base_domain)
        .bind(blob)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_checkpoint(
        &self,
        base_domain: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT state_blob FROM crawl_states WHERE base_domain = ?")
                .bind(base_domain)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((blob,)) => Ok(Some(serde_json::from_str(&blob)?)),
            None => Ok(None),
        }
    }

    /// Crawl record plus, for completed crawls, the outgoing-domain rollup.
    pub async fn status_view(
        &self,
        base_domain: &str,
    ) -> Result<Option<CrawlStatusView>, StoreError> {
        let record = match self.latest_crawl(base_domain).await? {
            Some(r) => r,
            None => return Ok(None),
        };

        let outgoing_domains = if record.status == CrawlStatus::Completed {
            self.outgoing_domains(record.crawl_id).await?
        } else {
            Vec::new()
        };

        Ok(Some(CrawlStatusView {
            record,
            outgoing_domains,
        }))
    }

    /// Rows already persisted for a crawl; used to re-seed counters on resume.
    pub async fn count_links(&self, crawl_id: i64) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM outgoing_links WHERE crawl_id = ?")
                .bind(crawl_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    pub async fn outgoing_domains(&self, crawl_id: i64) -> Result<Vec<DomainSummary>, StoreError> {
        let rows = sqlx::query_as::<_, DomainSummaryRow>(
            "SELECT target_domain, link_count, first_seen_at, last_seen_at
             FROM outgoing_domains WHERE crawl_id = ?
             ORDER BY link_count DESC, target_domain",
        )
        .bind(crawl_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DomainSummaryRow::into_summary).collect()
    }

    /// Paginated, filtered rows from the latest crawl of a domain.
    pub async fn links(
        &self,
        base_domain: &str,
        query: &LinkQuery,
    ) -> Result<LinkPage, StoreError> {
        let record = match self.latest_crawl(base_domain).await? {
            Some(r) => r,
            None => {
                return Ok(LinkPage {
                    rows: Vec::new(),
                    total: 0,
                    page: query.page.max(1),
                    limit: query.limit,
                })
            }
        };

        let mut clauses = vec!["crawl_id = ?".to_string()];
        if query.text_filter.is_some() {
            clauses.push("(anchor_text LIKE ? OR target_url LIKE ?)".to_string());
        }
        match query.rel {
            RelFilter::All => {}
            RelFilter::Nofollow => clauses.push("is_nofollow = 1".to_string()),
            RelFilter::Dofollow => clauses.push("is_nofollow = 0".to_string()),
        }
        if query.domain_filter.is_some() {
            clauses.push("target_domain = ?".to_string());
        }
        let where_sql = clauses.join(" AND ");

        let page = query.page.max(1);
        let limit = query.limit.max(1);
        let offset = (page as i64 - 1) * limit as i64;
        let pattern = query.text_filter.as_ref().map(|t| format!("%{}%", t));

        let select_sql = format!(
            "SELECT crawl_id, source_url, target_url, target_domain, anchor_text,
                    rel, is_nofollow, observed_at
             FROM outgoing_links WHERE {} ORDER BY id LIMIT ? OFFSET ?",
            where_sql
        );
        let mut select = sqlx::query_as::<_, OutgoingLinkRow>(&select_sql).bind(record.crawl_id);
        if let Some(ref p) = pattern {
            select = select.bind(p).bind(p);
        }
        if let Some(ref domain) = query.domain_filter {
            select = select.bind(domain);
        }
        let rows = select
            .bind(limit as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM outgoing_links WHERE {}", where_sql);
        let mut count = sqlx::query_as::<_, (i64,)>(&count_sql).bind(record.crawl_id);
        if let Some(ref p) = pattern {
            count = count.bind(p).bind(p);
        }
        if let Some(ref domain) = query.domain_filter {
            count = count.bind(domain);
        }
        let (total,) = count.fetch_one(&self.pool).await?;

        Ok(LinkPage {
            rows: rows
                .into_iter()
                .map(OutgoingLinkRow::into_link)
                .collect::<Result<_, _>>()?,
            total,
            page,
            limit,
        })
    }
}

#[derive(Debug, FromRow)]
struct DomainRow {
    id: i64,
    base_domain: String,
    status: String,
    pages_crawled: i64,
    external_links_total: i64,
    max_depth: i64,
    created_at: String,
    updated_at: String,
}

impl DomainRow {
    fn into_record(self) -> Result<CrawlRecord, StoreError> {
        Ok(CrawlRecord {
            crawl_id: self.id,
            status: CrawlStatus::parse(&self.status)
                .ok_or_else(|| StoreError::Decode(format!("unknown status {:?}", self.status)))?,
            base_domain: self.base_domain,
            max_depth: self.max_depth as u32,
            pages_crawled: self.pages_crawled as u64,
            external_links_total: self.external_links_total as u64,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutgoingLinkRow {
    crawl_id: i64,
    source_url: String,
    target_url: String,
    target_domain: String,
    anchor_text: String,
    rel: Option<String>,
    is_nofollow: bool,
    observed_at: String,
}

impl OutgoingLinkRow {
    fn into_link(self) -> Result<LinkRow, StoreError> {
        Ok(LinkRow {
            crawl_id: self.crawl_id,
            source_url: self.source_url,
            target_url: self.target_url,
            target_domain: self.target_domain,
            anchor_text: self.anchor_text,
            rel: self.rel,
            is_nofollow: self.is_nofollow,
            observed_at: parse_timestamp(&self.observed_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct DomainSummaryRow {
    target_domain: String,
    link_count: i64,
    first_seen_at: String,
    last_seen_at: String,
}

impl DomainSummaryRow {
    fn into_summary(self) -> Result<DomainSummary, StoreError> {
        Ok(DomainSummary {
            target_domain: self.target_domain,
            link_count: self.link_count,
            first_seen_at: parse_timestamp(&self.first_seen_at)?,
            last_seen_at: parse_timestamp(&self.last_seen_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("invalid timestamp {:?}: {}", raw, e)))
}
