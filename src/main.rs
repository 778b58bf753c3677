use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use outlinks::cli::{Cli, Commands};
use outlinks::config::CrawlOptions;
use outlinks::control::Control;
use outlinks::logging;
use outlinks::models::{LinkQuery, RelFilter};
use outlinks::store::LinkStore;
use outlinks::url_utils;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    let _log_guard = logging::init_logging(cli.log_dir.as_deref().map(Path::new))?;

    let store = Arc::new(LinkStore::open(&cli.database).await?);
    let control = Control::new(store);

    match cli.command {
        Commands::Crawl {
            url,
            max_pages,
            max_depth,
            concurrency,
            crawl_delay_ms,
            no_subdomains,
            no_sitemaps,
            no_robots,
            no_language_variants,
            no_pagination,
            user_agent,
            resume,
        } => {
            let start_url = url_utils::normalize_url_for_cli(&url);
            let options = CrawlOptions {
                max_pages,
                max_depth,
                concurrency,
                crawl_delay_ms,
                include_subdomains: !no_subdomains,
                follow_sitemaps: !no_sitemaps,
                respect_robots: !no_robots,
                include_language_variants: !no_language_variants,
                follow_pagination: !no_pagination,
                user_agent,
                resume,
            };

            // Ctrl-C stops workers at their next pop boundary; the
            // controller then writes a final checkpoint so the crawl can
            // be resumed.
            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, finishing current fetches");
                    signal_cancel.cancel();
                }
            });

            let summary = control.run(&start_url, options, cancel).await?;

            println!("Crawl {} of {}", summary.status, summary.base_domain);
            println!("  Pages crawled:   {}", summary.pages_crawled);
            println!("  External links:  {}", summary.external_links);
            println!("  Fetch errors:    {}", summary.fetch_errors);
            println!("  Duration:        {}s", summary.duration_secs);
        }

        Commands::Status { domain } => match control.status(&domain).await? {
            Some(view) => {
                let r = &view.record;
                println!(
                    "{} [{}] crawl #{}: {} pages, {} external links (updated {})",
                    r.base_domain,
                    r.status,
                    r.crawl_id,
                    r.pages_crawled,
                    r.external_links_total,
                    r.updated_at.to_rfc3339()
                );
                for summary in &view.outgoing_domains {
                    println!(
                        "  {:<40} {:>6} links (last seen {})",
                        summary.target_domain,
                        summary.link_count,
                        summary.last_seen_at.to_rfc3339()
                    );
                }
            }
            None => println!("No crawl found for {}", domain),
        },

        Commands::Links {
            domain,
            page,
            limit,
            text,
            rel,
            target_domain,
        } => {
            let rel = RelFilter::parse(&rel)
                .ok_or_else(|| format!("invalid rel filter {:?} (all|nofollow|dofollow)", rel))?;
            let result = control
                .links(
                    &domain,
                    &LinkQuery {
                        page,
                        limit,
                        text_filter: text,
                        rel,
                        domain_filter: target_domain,
                    },
                )
                .await?;

            println!(
                "{} links (page {} of {})",
                result.total,
                result.page,
                (result.total as u64).div_ceil(result.limit.max(1) as u64).max(1)
            );
            for row in &result.rows {
                let marker = if row.is_nofollow { "nofollow" } else { "follow" };
                println!(
                    "  {} -> {} [{}] {:?}",
                    row.source_url, row.target_url, marker, row.anchor_text
                );
            }
        }
    }

    Ok(())
}
