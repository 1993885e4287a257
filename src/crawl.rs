use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::cli::CrawlArgs;
use crate::extract::BookExtractor;
use crate::formats::{BookRecord, PageKind, PageVisit};

#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> anyhow::Result<FetchedPage>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build crawl http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> anyhow::Result<FetchedPage> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, concat!("bookcrawl/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))?;

        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub concurrency: usize,
    /// Sleep before every request.
    pub delay: Duration,
    /// Cap on listing pages; `None` follows "next" until it disappears.
    pub max_pages: Option<usize>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            delay: Duration::ZERO,
            max_pages: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    /// Discovery order.
    pub records: Vec<BookRecord>,
    pub visits: Vec<PageVisit>,
    pub listing_pages: usize,
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let start_url = Url::parse(&args.url).context("parse --url")?;
    if start_url.scheme() != "http" && start_url.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {start_url}");
    }

    let out_path = PathBuf::from(&args.out);
    if out_path.exists() && !args.force {
        anyhow::bail!("dataset output already exists: {}", out_path.display());
    }
    let crawl_log_path = args.crawl_log.as_ref().map(PathBuf::from);
    if let Some(path) = crawl_log_path.as_deref() {
        if path.exists() && !args.force {
            anyhow::bail!("crawl log output already exists: {}", path.display());
        }
    }

    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new()?);
    let extractor = Arc::new(BookExtractor::new().context("build extractor")?);
    let options = CrawlOptions {
        concurrency: args.concurrency.max(1),
        delay: Duration::from_millis(args.delay_ms),
        max_pages: args.max_pages,
    };

    let outcome = crawl_catalog(fetcher, extractor, start_url, &options).await?;

    crate::dataset::write_dataset(&out_path, &outcome.records, args.force)
        .context("write dataset")?;
    if let Some(path) = crawl_log_path.as_deref() {
        write_crawl_log(path, &outcome.visits).context("write crawl log")?;
    }

    tracing::info!(
        records = outcome.records.len(),
        listing_pages = outcome.listing_pages,
        out = %out_path.display(),
        "crawl finished"
    );
    Ok(())
}

/// Walks listing pages via their "next" link and extracts one record per
/// detail link. Detail links are not deduplicated.
pub async fn crawl_catalog(
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<BookExtractor>,
    start_url: Url,
    options: &CrawlOptions,
) -> anyhow::Result<CrawlOutcome> {
    let mut outcome = CrawlOutcome::default();
    let mut visited_listings: HashSet<String> = HashSet::new();
    let mut next = Some(start_url);

    while let Some(page_url) = next.take() {
        if options
            .max_pages
            .is_some_and(|max| outcome.listing_pages >= max)
        {
            tracing::info!(max_pages = ?options.max_pages, "listing page limit reached");
            break;
        }
        if !visited_listings.insert(page_url.to_string()) {
            tracing::warn!(url = %page_url, "next link points to a visited listing page; stopping");
            break;
        }

        sleep_before_request(options.delay).await;
        let fetched = fetcher.fetch(&page_url).await;
        outcome.visits.push(page_visit(&page_url, PageKind::Listing, &fetched));

        let page = match fetched {
            Ok(page) if page.is_success() => page,
            Ok(page) => {
                if outcome.listing_pages == 0 {
                    anyhow::bail!("start page returned HTTP {}: {page_url}", page.status);
                }
                tracing::warn!(
                    url = %page_url,
                    status = page.status,
                    "listing page failed; stopping"
                );
                break;
            }
            Err(err) => {
                if outcome.listing_pages == 0 {
                    return Err(err).context("fetch start page");
                }
                tracing::warn!(url = %page_url, ?err, "listing page failed; stopping");
                break;
            }
        };
        outcome.listing_pages += 1;

        let listing = extractor.parse_listing(&page.body, &page.url);
        tracing::info!(
            url = %page.url,
            detail_links = listing.detail_links.len(),
            has_next = listing.next_link.is_some(),
            "listing page"
        );

        let details = fetch_details(&fetcher, &extractor, listing.detail_links, options).await;
        for (record, visit) in details {
            outcome.visits.push(visit);
            if let Some(record) = record {
                outcome.records.push(record);
            }
        }

        next = listing.next_link;
    }

    Ok(outcome)
}

async fn fetch_details(
    fetcher: &Arc<dyn PageFetcher>,
    extractor: &Arc<BookExtractor>,
    links: Vec<Url>,
    options: &CrawlOptions,
) -> Vec<(Option<BookRecord>, PageVisit)> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let count = links.len();

    for (index, link) in links.into_iter().enumerate() {
        let fetcher = Arc::clone(fetcher);
        let extractor = Arc::clone(extractor);
        let semaphore = Arc::clone(&semaphore);
        let delay = options.delay;
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            sleep_before_request(delay).await;
            let fetched = fetcher.fetch(&link).await;
            let visit = page_visit(&link, PageKind::Detail, &fetched);
            let record = match fetched {
                Ok(page) if page.is_success() => {
                    Some(extractor.extract_book(&page.body, &page.url))
                }
                Ok(page) => {
                    tracing::warn!(
                        url = %link,
                        status = page.status,
                        "detail page failed; skipping"
                    );
                    None
                }
                Err(err) => {
                    tracing::warn!(url = %link, ?err, "detail page failed; skipping");
                    None
                }
            };
            (index, record, visit)
        });
    }

    let mut slots: Vec<Option<(Option<BookRecord>, PageVisit)>> = vec![None; count];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, record, visit)) => slots[index] = Some((record, visit)),
            Err(err) => tracing::warn!(?err, "detail task aborted"),
        }
    }

    slots.into_iter().flatten().collect()
}

async fn sleep_before_request(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn page_visit(url: &Url, kind: PageKind, fetched: &anyhow::Result<FetchedPage>) -> PageVisit {
    PageVisit {
        url: url.to_string(),
        kind,
        status: fetched.as_ref().ok().map(|page| page.status),
        retrieved_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn write_crawl_log(path: &Path, visits: &[PageVisit]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create crawl log parent dir: {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .with_context(|| format!("create crawl log: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for visit in visits {
        serde_json::to_writer(&mut out, visit).context("write page visit json")?;
        out.write_all(b"\n").context("write page visit newline")?;
    }
    out.flush().context("flush crawl log")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned pages and counts every request.
    struct StubFetcher {
        pages: HashMap<String, String>,
        hits: Mutex<HashMap<String, usize>>,
    }

    impl StubFetcher {
        fn new(pages: Vec<(String, String)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                hits: Mutex::new(HashMap::new()),
            }
        }

        fn hits(&self, url: &str) -> usize {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> anyhow::Result<FetchedPage> {
            *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
            match self.pages.get(url.as_str()) {
                Some(body) => Ok(FetchedPage {
                    url: url.clone(),
                    status: 200,
                    body: body.clone(),
                }),
                None if url.path().contains("broken") => anyhow::bail!("connection reset"),
                None => Ok(FetchedPage {
                    url: url.clone(),
                    status: 404,
                    body: "not found".to_owned(),
                }),
            }
        }
    }

    const BASE: &str = "http://books.example";

    fn listing(details: &[&str], next: Option<&str>) -> String {
        let mut html = String::from("<html><body><ol>");
        for detail in details {
            html.push_str(&format!(
                r#"<li><article class="product_pod"><h3><a href="{detail}">x</a></h3></article></li>"#
            ));
        }
        html.push_str("</ol><ul class=\"pager\">");
        if let Some(next) = next {
            html.push_str(&format!(r#"<li class="next"><a href="{next}">next</a></li>"#));
        }
        html.push_str("</ul></body></html>");
        html
    }

    fn detail(title: &str, word: &str) -> String {
        format!(
            r#"<html><body><h1>{title}</h1><p class="price_color">£10.00</p>
            <p class="star-rating {word}"></p></body></html>"#
        )
    }

    fn page(path: &str, body: String) -> (String, String) {
        (format!("{BASE}{path}"), body)
    }

    async fn crawl(fetcher: Arc<StubFetcher>) -> anyhow::Result<CrawlOutcome> {
        let extractor = Arc::new(BookExtractor::new()?);
        let start = Url::parse(&format!("{BASE}/index.html"))?;
        crawl_catalog(fetcher, extractor, start, &CrawlOptions::default()).await
    }

    #[tokio::test]
    async fn three_page_catalog_visits_each_page_once() {
        let fetcher = Arc::new(StubFetcher::new(vec![
            page(
                "/index.html",
                listing(&["book/a.html", "book/b.html"], Some("page-2.html")),
            ),
            page("/page-2.html", listing(&["book/c.html"], Some("page-3.html"))),
            page("/page-3.html", listing(&["book/d.html", "book/e.html"], None)),
            page("/book/a.html", detail("A", "One")),
            page("/book/b.html", detail("B", "Two")),
            page("/book/c.html", detail("C", "Three")),
            page("/book/d.html", detail("D", "Four")),
            page("/book/e.html", detail("E", "Five")),
        ]));

        let outcome = crawl(Arc::clone(&fetcher)).await.unwrap();

        assert_eq!(outcome.listing_pages, 3);
        for path in ["/index.html", "/page-2.html", "/page-3.html"] {
            assert_eq!(fetcher.hits(&format!("{BASE}{path}")), 1, "{path}");
        }
        let titles: Vec<&str> = outcome
            .records
            .iter()
            .filter_map(|r| r.title.as_deref())
            .collect();
        assert_eq!(titles, vec!["A", "B", "C", "D", "E"]);
        let ratings: Vec<u8> = outcome.records.iter().map(|r| r.rating).collect();
        assert_eq!(ratings, vec![1, 2, 3, 4, 5]);
        assert_eq!(outcome.records[0].url, format!("{BASE}/book/a.html"));
        assert_eq!(outcome.visits.len(), 8);
    }

    #[tokio::test]
    async fn failed_detail_pages_produce_no_record() {
        let fetcher = Arc::new(StubFetcher::new(vec![
            page(
                "/index.html",
                listing(&["book/a.html", "book/missing.html", "book/broken.html"], None),
            ),
            page("/book/a.html", detail("A", "One")),
        ]));

        let outcome = crawl(fetcher).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        let statuses: Vec<Option<u16>> = outcome.visits.iter().map(|v| v.status).collect();
        assert_eq!(statuses, vec![Some(200), Some(200), Some(404), None]);
    }

    #[tokio::test]
    async fn duplicate_detail_links_are_kept() {
        let fetcher = Arc::new(StubFetcher::new(vec![
            page("/index.html", listing(&["book/a.html"], Some("page-2.html"))),
            page("/page-2.html", listing(&["book/a.html"], None)),
            page("/book/a.html", detail("A", "Three")),
        ]));

        let outcome = crawl(Arc::clone(&fetcher)).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(fetcher.hits(&format!("{BASE}/book/a.html")), 2);
    }

    #[tokio::test]
    async fn next_link_cycle_terminates() {
        let fetcher = Arc::new(StubFetcher::new(vec![
            page("/index.html", listing(&[], Some("page-2.html"))),
            page("/page-2.html", listing(&[], Some("index.html"))),
        ]));

        let outcome = crawl(Arc::clone(&fetcher)).await.unwrap();

        assert_eq!(outcome.listing_pages, 2);
        assert_eq!(fetcher.hits(&format!("{BASE}/index.html")), 1);
    }

    #[tokio::test]
    async fn start_page_failure_is_fatal_but_later_failure_is_not() {
        let fetcher = Arc::new(StubFetcher::new(vec![]));
        assert!(crawl(fetcher).await.is_err());

        let fetcher = Arc::new(StubFetcher::new(vec![
            page("/index.html", listing(&["book/a.html"], Some("page-2.html"))),
            page("/book/a.html", detail("A", "One")),
        ]));
        let outcome = crawl(fetcher).await.unwrap();
        assert_eq!(outcome.listing_pages, 1);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn max_pages_caps_listing_traversal() {
        let fetcher = Arc::new(StubFetcher::new(vec![
            page("/index.html", listing(&["book/a.html"], Some("page-2.html"))),
            page("/page-2.html", listing(&["book/b.html"], None)),
            page("/book/a.html", detail("A", "One")),
            page("/book/b.html", detail("B", "Two")),
        ]));
        let extractor = Arc::new(BookExtractor::new().unwrap());
        let start = Url::parse(&format!("{BASE}/index.html")).unwrap();
        let options = CrawlOptions {
            max_pages: Some(1),
            ..CrawlOptions::default()
        };

        let outcome = crawl_catalog(fetcher, extractor, start, &options)
            .await
            .unwrap();

        assert_eq!(outcome.listing_pages, 1);
        assert_eq!(outcome.records.len(), 1);
    }
}
