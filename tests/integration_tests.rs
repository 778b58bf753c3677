//! End-to-end crawl scenarios against a local mock HTTP server.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use outlinks::config::CrawlOptions;
use outlinks::control::Control;
use outlinks::models::{
    CrawlStatus, EntryKind, ExternalLink, FrontierEntry, LinkQuery, RelFilter,
};
use outlinks::store::LinkStore;

const BASE_DOMAIN: &str = "127.0.0.1";

async fn in_memory_control() -> (Control, Arc<LinkStore>) {
    let store = Arc::new(LinkStore::in_memory().await.unwrap());
    (Control::new(Arc::clone(&store)), store)
}

/// Options tuned for tests: no politeness delay, no discovery unless a
/// scenario turns it back on.
fn fast_options() -> CrawlOptions {
    CrawlOptions {
        concurrency: 2,
        crawl_delay_ms: 0,
        follow_sitemaps: false,
        respect_robots: false,
        ..Default::default()
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_basic_crawl_records_external_link() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/about">A</a><a href="https://other.test/x" rel="nofollow">X</a>"#,
    )
    .await;
    mount_page(&server, "/about", "<p>about</p>").await;

    let (control, store) = in_memory_control().await;
    let summary = control
        .run(&server.uri(), fast_options(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, CrawlStatus::Completed);
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(summary.external_links, 1);
    assert_eq!(summary.fetch_errors, 0);

    let links = control
        .links(BASE_DOMAIN, &LinkQuery::default())
        .await
        .unwrap();
    assert_eq!(links.total, 1);
    let row = &links.rows[0];
    assert_eq!(row.source_url, format!("{}/", server.uri()));
    assert_eq!(row.target_url, "https://other.test/x");
    assert_eq!(row.target_domain, "other.test");
    assert_eq!(row.anchor_text, "X");
    assert!(row.is_nofollow);

    let view = control.status(BASE_DOMAIN).await.unwrap().unwrap();
    assert_eq!(view.record.status, CrawlStatus::Completed);
    assert_eq!(view.record.pages_crawled, 2);
    assert_eq!(view.outgoing_domains.len(), 1);
    assert_eq!(view.outgoing_domains[0].target_domain, "other.test");
    assert_eq!(view.outgoing_domains[0].link_count, 1);

    // The final checkpoint reflects the drained crawl.
    let checkpoint = store.load_checkpoint(BASE_DOMAIN).await.unwrap().unwrap();
    assert_eq!(checkpoint.crawled.len(), 2);
    assert!(checkpoint.frontier.is_empty());
}

#[tokio::test]
async fn test_redirected_start_url_uses_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/home"))
        .mount(&server)
        .await;
    mount_page(&server, "/home", r#"<a href="https://other.test/x">X</a>"#).await;

    let (control, store) = in_memory_control().await;
    let summary = control
        .run(&server.uri(), fast_options(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_crawled, 1);

    let links = control
        .links(BASE_DOMAIN, &LinkQuery::default())
        .await
        .unwrap();
    assert_eq!(links.total, 1);
    assert_eq!(links.rows[0].source_url, format!("{}/home", server.uri()));

    // The crawled set holds the post-redirect URL, not the entry URL.
    let checkpoint = store.load_checkpoint(BASE_DOMAIN).await.unwrap().unwrap();
    assert_eq!(checkpoint.crawled, vec![format!("{}/home", server.uri())]);
}

#[tokio::test]
async fn test_sitemap_seeding_and_non_html_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<p>root</p>").await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                  <url><loc>{0}/a</loc></url>
                  <url><loc>{0}/b</loc></url>
                  <url><loc>https://foreign.test/never</loc></url>
                </urlset>"#,
                server.uri()
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;
    mount_page(&server, "/a", r#"<a href="https://ext.test/p">ext</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("plain text", "text/plain"))
        .mount(&server)
        .await;

    let (control, _store) = in_memory_control().await;
    let options = CrawlOptions {
        follow_sitemaps: true,
        max_pages: 10,
        ..fast_options()
    };
    let summary = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    // Root plus /a plus non-HTML /b; the foreign loc is never admitted.
    assert_eq!(summary.pages_crawled, 3);
    assert_eq!(summary.external_links, 1);

    let links = control
        .links(BASE_DOMAIN, &LinkQuery::default())
        .await
        .unwrap();
    assert_eq!(links.total, 1);
    assert_eq!(links.rows[0].target_url, "https://ext.test/p");
}

#[tokio::test]
async fn test_nested_sitemap_index_reaches_leaves() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<p>root</p>").await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                  <sitemap><loc>{0}/sitemap-posts.xml</loc></sitemap>
                </sitemapindex>"#,
                server.uri()
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap-posts.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                  <url><loc>{0}/post-1</loc></url>
                </urlset>"#,
                server.uri()
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;
    mount_page(&server, "/post-1", "<p>post</p>").await;

    let (control, _store) = in_memory_control().await;
    let options = CrawlOptions {
        follow_sitemaps: true,
        ..fast_options()
    };
    let summary = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    // The admitted URLs are the terminal leaves, not the nested index.
    assert_eq!(summary.pages_crawled, 2);
}

#[tokio::test]
async fn test_robots_declared_sitemap_is_used() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<p>root</p>").await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "User-agent: *\nSitemap: {}/deep/map.xml\n",
            server.uri()
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deep/map.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<urlset><url><loc>{}/hidden</loc></url></urlset>"#,
                server.uri()
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;
    mount_page(&server, "/hidden", "<p>found</p>").await;

    let (control, _store) = in_memory_control().await;
    let options = CrawlOptions {
        respect_robots: true,
        ..fast_options()
    };
    let summary = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_crawled, 2);
}

#[tokio::test]
async fn test_max_pages_one_fetches_only_start() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/one">1</a><a href="/two">2</a><a href="https://other.test/x">X</a>"#,
    )
    .await;

    let (control, store) = in_memory_control().await;
    let options = CrawlOptions {
        max_pages: 1,
        ..fast_options()
    };
    let summary = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_crawled, 1);
    // The cap blocks every further admission.
    let checkpoint = store.load_checkpoint(BASE_DOMAIN).await.unwrap().unwrap();
    assert_eq!(checkpoint.discovered.len(), 1);
    // External links are still recorded; the cap bounds fetches, not rows.
    assert_eq!(summary.external_links, 1);
}

#[tokio::test]
async fn test_max_depth_zero_skips_outlinks_at_pop() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/about">A</a>"#).await;
    mount_page(&server, "/about", r#"<a href="https://other.test/x">X</a>"#).await;

    let (control, store) = in_memory_control().await;
    let options = CrawlOptions {
        max_depth: 0,
        ..fast_options()
    };
    let summary = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    // /about is admitted at depth 1 but skipped at pop.
    assert_eq!(summary.pages_crawled, 1);
    assert_eq!(summary.external_links, 0);
    let checkpoint = store.load_checkpoint(BASE_DOMAIN).await.unwrap().unwrap();
    assert!(checkpoint
        .discovered
        .contains(&format!("{}/about", server.uri())));
}

#[tokio::test]
async fn test_non_html_start_url_completes_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.4", "application/pdf"))
        .mount(&server)
        .await;

    let (control, _store) = in_memory_control().await;
    let summary = control
        .run(&server.uri(), fast_options(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, CrawlStatus::Completed);
    assert_eq!(summary.pages_crawled, 1);
    assert_eq!(summary.external_links, 0);
}

#[tokio::test]
async fn test_fetch_errors_are_counted_not_fatal() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/missing">m</a><a href="/ok">ok</a>"#).await;
    mount_page(&server, "/ok", "<p>fine</p>").await;
    // /missing has no mock and returns 404.

    let (control, _store) = in_memory_control().await;
    let summary = control
        .run(&server.uri(), fast_options(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, CrawlStatus::Completed);
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(summary.fetch_errors, 1);
}

#[tokio::test]
async fn test_concurrent_fan_out_over_sitemap() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<p>root</p>").await;

    let mut locs = String::new();
    for i in 0..12 {
        locs.push_str(&format!("<url><loc>{}/p{}</loc></url>", server.uri(), i));
        mount_page(
            &server,
            &format!("/p{}", i),
            &format!(r#"<a href="https://ext{}.test/x">out</a>"#, i),
        )
        .await;
    }
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(format!("<urlset>{}</urlset>", locs), "application/xml"),
        )
        .mount(&server)
        .await;

    let (control, _store) = in_memory_control().await;
    let options = CrawlOptions {
        follow_sitemaps: true,
        concurrency: 5,
        ..fast_options()
    };
    let summary = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_crawled, 13);
    assert_eq!(summary.external_links, 12);

    let view = control.status(BASE_DOMAIN).await.unwrap().unwrap();
    assert_eq!(view.outgoing_domains.len(), 12);
    assert!(view.outgoing_domains.iter().all(|d| d.link_count == 1));
}

#[tokio::test]
async fn test_resume_after_completion_is_a_no_op() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/about">A</a><a href="https://other.test/x">X</a>"#,
    )
    .await;
    mount_page(&server, "/about", "<p>about</p>").await;

    let (control, store) = in_memory_control().await;
    let first = control
        .run(&server.uri(), fast_options(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.pages_crawled, 2);

    let options = CrawlOptions {
        resume: true,
        ..fast_options()
    };
    let second = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    // A fresh crawl id, but the restored frontier is empty and the
    // discovered set blocks re-seeding: nothing is fetched again.
    assert!(second.crawl_id > first.crawl_id);
    assert_eq!(second.status, CrawlStatus::Completed);
    assert_eq!(second.pages_crawled, 2);
    assert_eq!(store.count_links(first.crawl_id).await.unwrap(), 1);
    assert_eq!(store.count_links(second.crawl_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_resume_continues_interrupted_crawl_without_duplicates() {
    let server = MockServer::start().await;
    mount_page(&server, "/c", r#"<a href="https://other.test/x">X</a>"#).await;

    let (control, store) = in_memory_control().await;

    // State as an interrupted crawl would have left it: /a checkpointed as
    // crawled, /c fetched and flushed but killed before the next checkpoint
    // recorded it, so the restored frontier still holds /c.
    let crawl_id = store.create_crawl(BASE_DOMAIN, 10).await.unwrap();
    store
        .append_links(
            crawl_id,
            &[ExternalLink {
                source_url: format!("{}/c", server.uri()),
                target_url: "https://other.test/x".to_string(),
                target_domain: "other.test".to_string(),
                anchor_text: "X".to_string(),
                rel: None,
                is_nofollow: false,
                observed_at: chrono::Utc::now(),
            }],
        )
        .await
        .unwrap();
    let checkpoint = outlinks::models::Checkpoint {
        discovered: vec![
            format!("{}/a", server.uri()),
            format!("{}/c", server.uri()),
        ],
        crawled: vec![format!("{}/a", server.uri())],
        frontier: vec![FrontierEntry {
            url: format!("{}/c", server.uri()),
            depth: 1,
            source_url: format!("{}/a", server.uri()),
            kind: EntryKind::Internal,
            priority: 5,
        }],
        saved_at_ms: 1,
        ..Default::default()
    };
    store.save_checkpoint(BASE_DOMAIN, &checkpoint).await.unwrap();

    let options = CrawlOptions {
        resume: true,
        ..fast_options()
    };
    let summary = control
        .run(&server.uri(), options, CancellationToken::new())
        .await
        .unwrap();

    // The open crawl id is reused, so the replayed row is discarded by the
    // storage uniqueness constraint.
    assert_eq!(summary.crawl_id, crawl_id);
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(summary.external_links, 1);
    assert_eq!(store.count_links(crawl_id).await.unwrap(), 1);

    let view = control.status(BASE_DOMAIN).await.unwrap().unwrap();
    assert_eq!(view.record.status, CrawlStatus::Completed);
    assert_eq!(view.record.pages_crawled, 2);
    assert_eq!(view.record.external_links_total, 1);
}

#[tokio::test]
async fn test_single_worker_rerun_yields_same_pairs() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/a">a</a><a href="https://one.test/1">1</a>"#,
    )
    .await;
    mount_page(
        &server,
        "/a",
        r#"<a href="https://two.test/2">2</a><a href="/">home</a>"#,
    )
    .await;

    let mut runs = Vec::new();
    for _ in 0..2 {
        let (control, _store) = in_memory_control().await;
        let options = CrawlOptions {
            concurrency: 1,
            ..fast_options()
        };
        control
            .run(&server.uri(), options, CancellationToken::new())
            .await
            .unwrap();
        let links = control
            .links(BASE_DOMAIN, &LinkQuery::default())
            .await
            .unwrap();
        let mut pairs: Vec<(String, String)> = links
            .rows
            .into_iter()
            .map(|r| (r.source_url, r.target_url))
            .collect();
        pairs.sort();
        runs.push(pairs);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].len(), 2);
}

#[tokio::test]
async fn test_nofollow_filter_splits_rows() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="https://ads.test/promo" rel="sponsored nofollow">Ad</a>
           <a href="https://other.test/x">Plain</a>"#,
    )
    .await;

    let (control, _store) = in_memory_control().await;
    control
        .run(&server.uri(), fast_options(), CancellationToken::new())
        .await
        .unwrap();

    let nofollow = control
        .links(
            BASE_DOMAIN,
            &LinkQuery {
                rel: RelFilter::Nofollow,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(nofollow.total, 1);
    assert_eq!(nofollow.rows[0].target_domain, "ads.test");
    assert_eq!(nofollow.rows[0].rel.as_deref(), Some("sponsored nofollow"));

    let dofollow = control
        .links(
            BASE_DOMAIN,
            &LinkQuery {
                rel: RelFilter::Dofollow,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(dofollow.total, 1);
    assert_eq!(dofollow.rows[0].target_domain, "other.test");
}

#[tokio::test]
async fn test_cancellation_checkpoints_and_stays_resumable() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/next">n</a>"#).await;
    mount_page(&server, "/next", "<p>next</p>").await;

    let (control, store) = in_memory_control().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = control
        .run(&server.uri(), fast_options(), cancel)
        .await
        .unwrap();

    // Workers observed the cancellation before fetching anything; the
    // record stays non-terminal and the seeded frontier is checkpointed.
    assert_eq!(summary.status, CrawlStatus::Processing);
    assert_eq!(summary.pages_crawled, 0);

    let view = control.status(BASE_DOMAIN).await.unwrap().unwrap();
    assert_eq!(view.record.status, CrawlStatus::Processing);

    let checkpoint = store.load_checkpoint(BASE_DOMAIN).await.unwrap().unwrap();
    assert!(!checkpoint.frontier.is_empty());
}
