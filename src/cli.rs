use clap::{Parser, Subcommand};

/// outlinks cli
#[derive(Parser)]
#[command(name = "outlinks")]
#[command(about = "Crawl a site and map every outbound link to foreign domains")]
#[command(version)]
pub struct Cli {
    /// SQLite database holding crawl results and checkpoints
    #[arg(long, global = true, default_value = "./outlinks.db")]
    pub database: String,

    /// Directory for rotated log files (stdout only when omitted)
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl a site and stream its external links into the database
    Crawl {
        /// Starting URL (scheme defaults to https://)
        url: String,

        /// Maximum URLs admitted to the frontier
        #[arg(long, default_value = "5000")]
        max_pages: usize,

        /// Maximum link depth from the start URL
        #[arg(long, default_value = "10")]
        max_depth: u32,

        /// Worker pool size
        #[arg(short, long, default_value = "5")]
        concurrency: usize,

        /// Delay between requests per worker, in milliseconds
        #[arg(long, default_value = "300")]
        crawl_delay_ms: u64,

        /// Restrict scope to the exact host (no subdomains)
        #[arg(long)]
        no_subdomains: bool,

        /// Skip sitemap discovery at seed time
        #[arg(long)]
        no_sitemaps: bool,

        /// Skip robots.txt sitemap hints
        #[arg(long)]
        no_robots: bool,

        /// Do not boost language-variant URLs
        #[arg(long)]
        no_language_variants: bool,

        /// Do not boost pagination URLs
        #[arg(long)]
        no_pagination: bool,

        /// User agent string for requests
        #[arg(short, long, default_value = crate::config::DEFAULT_USER_AGENT)]
        user_agent: String,

        /// Continue from the saved checkpoint for this domain
        #[arg(long)]
        resume: bool,
    },

    /// Show the latest crawl record for a domain
    Status {
        /// Base domain of the crawl
        domain: String,
    },

    /// List extracted external links for a domain
    Links {
        /// Base domain of the crawl
        domain: String,

        /// 1-based page of results
        #[arg(long, default_value = "1")]
        page: u32,

        /// Rows per page
        #[arg(long, default_value = "50")]
        limit: u32,

        /// Substring filter on anchor text or target URL
        #[arg(long)]
        text: Option<String>,

        /// Filter by rel type: all, nofollow, dofollow
        #[arg(long, default_value = "all")]
        rel: String,

        /// Filter by exact target domain
        #[arg(long)]
        target_domain: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
