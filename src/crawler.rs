use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Result, ScraperError};
use crate::fetcher::{extract_links, html_to_text, HttpFetcher, PageFetcher};
use crate::frontier::{AddOptions, QueueManager};
use crate::limiter::RateLimiter;
use crate::models::{CompanyInfo, CrawlJob, CrawlReport, CrawlStrategy, ExtractedLead, QueueItem};
use crate::pipeline::{LeadExtractor, LeadTransformer, LeadValidator};
use crate::retry::RetryHandler;
use crate::webhook::{events, WebhookManager};

const SEED_PRIORITY: i32 = 10;

/// Runs a crawl job end to end: frontier, rate limiting, circuit-broken
/// fetches, extraction, transform, validation, webhook events.
pub struct LeadCrawler {
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<RateLimiter>,
    retry: Arc<RetryHandler>,
    extractor: Arc<LeadExtractor>,
    transformer: Arc<LeadTransformer>,
    validator: Arc<LeadValidator>,
    webhooks: WebhookManager,
}

impl LeadCrawler {
    pub fn new(config: &Config) -> Self {
        Self::with_fetcher(config, Arc::new(HttpFetcher::new()))
    }

    /// Build a crawler around a custom page fetcher.
    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            retry: Arc::new(RetryHandler::new(config.retry.clone())),
            extractor: Arc::new(LeadExtractor::new()),
            transformer: Arc::new(LeadTransformer::new()),
            validator: Arc::new(LeadValidator::new()),
            webhooks: WebhookManager::new(),
        }
    }

    pub fn webhooks(&self) -> &WebhookManager {
        &self.webhooks
    }

    /// Crawl from `job.start_url` until the frontier drains or the page
    /// budget is spent. Per-page failures are recorded, not fatal.
    pub async fn run(&self, job: CrawlJob) -> Result<CrawlReport> {
        Url::parse(&job.start_url)?;
        let start_time = Instant::now();
        info!(
            "🕷️  Starting crawl of {} (max {} pages, depth {}, {} workers)",
            job.start_url, job.max_pages, job.max_depth, job.concurrency
        );

        let queue = Arc::new(QueueManager::new(job.clone()));
        queue
            .add_to_queue(
                &job.start_url,
                AddOptions {
                    priority: SEED_PRIORITY,
                    depth: 0,
                    parent_url: None,
                },
            )
            .await;

        self.webhooks
            .trigger(
                events::SCRAPE_STARTED,
                json!({ "url": job.start_url, "maxPages": job.max_pages }),
            )
            .await;

        let ctx = WorkerContext {
            job: job.clone(),
            queue: queue.clone(),
            fetcher: self.fetcher.clone(),
            limiter: self.limiter.clone(),
            retry: self.retry.clone(),
            extractor: self.extractor.clone(),
            transformer: self.transformer.clone(),
            validator: self.validator.clone(),
            webhooks: self.webhooks.clone(),
            leads: Arc::new(Mutex::new(Vec::new())),
            company: Arc::new(Mutex::new(None)),
        };

        let workers = job.concurrency.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move { ctx.run_worker(worker_id).await }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                error!("Crawl worker panicked: {}", err);
            }
        }

        let raw_leads = {
            let mut guard = ctx.leads.lock().await;
            std::mem::take(&mut *guard)
        };
        let leads = self.transformer.merge_leads(raw_leads);
        let company = ctx.company.lock().await.clone();

        let stats = queue.statistics().await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        self.webhooks
            .trigger(
                events::SCRAPE_COMPLETED,
                json!({
                    "url": job.start_url,
                    "pagesCrawled": stats.status.completed,
                    "leadsFound": leads.len(),
                    "durationMs": duration_ms,
                }),
            )
            .await;

        info!(
            "🎯 Crawl complete for {}: {} pages, {} leads in {}ms",
            job.start_url,
            stats.status.completed,
            leads.len(),
            duration_ms
        );

        Ok(CrawlReport {
            start_url: job.start_url,
            pages_crawled: stats.status.completed,
            leads,
            company,
            failed_urls: stats.failed_urls,
            duration_ms,
        })
    }
}

/// Everything one worker task needs, cheaply cloneable.
#[derive(Clone)]
struct WorkerContext {
    job: CrawlJob,
    queue: Arc<QueueManager>,
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<RateLimiter>,
    retry: Arc<RetryHandler>,
    extractor: Arc<LeadExtractor>,
    transformer: Arc<LeadTransformer>,
    validator: Arc<LeadValidator>,
    webhooks: WebhookManager,
    leads: Arc<Mutex<Vec<ExtractedLead>>>,
    company: Arc<Mutex<Option<CompanyInfo>>>,
}

impl WorkerContext {
    async fn run_worker(self, worker_id: usize) {
        debug!("Worker {} started", worker_id);
        while let Some(item) = self.queue.next_item().await {
            self.process_item(item).await;
            if self.job.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.job.delay_ms)).await;
            }
        }
        debug!("Worker {} finished", worker_id);
    }

    async fn process_item(&self, item: QueueItem) {
        let url = item.url.clone();
        debug!("Processing {} (depth {}, priority {})", url, item.depth, item.priority);

        self.limiter.wait_for_slot(&url).await;

        let domain = Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        let circuit_key = format!("fetch:{}", domain);

        let fetcher = self.fetcher.clone();
        let fetch_url = url.clone();
        let outcome = self
            .retry
            .execute_with_circuit_breaker(
                &circuit_key,
                move || {
                    let fetcher = fetcher.clone();
                    let url = fetch_url.clone();
                    async move { fetcher.fetch(&url).await }
                },
                &url,
            )
            .await;

        match outcome {
            Ok(page) => {
                self.limiter.update_limits(&page.url, &page.headers).await;
                self.handle_page(&item, &page.body).await;
                self.queue.mark_completed(&url).await;
            }
            Err(err) => {
                warn!("Failed to fetch {}: {}", url, err);
                let retryable = !err.is_non_retryable()
                    && !matches!(err, ScraperError::CircuitOpen { .. });
                self.queue.mark_failed(&url, &err.to_string(), retryable).await;
                self.webhooks
                    .trigger(
                        events::SCRAPE_FAILED,
                        json!({ "url": url, "error": err.to_string() }),
                    )
                    .await;
            }
        }
    }

    async fn handle_page(&self, item: &QueueItem, html: &str) {
        let text = html_to_text(html);

        let extracted = self.extractor.extract_leads(&text, &item.url);
        if !extracted.is_empty() {
            let transformed = self.transformer.transform_leads(extracted);
            let outcome = self.validator.validate_leads(transformed);
            for (lead, errors) in &outcome.invalid {
                debug!("Dropping invalid lead from {}: {:?}", lead.source_url, errors);
            }
            if !outcome.valid.is_empty() {
                self.webhooks
                    .trigger(
                        events::LEAD_EXTRACTED,
                        json!({ "url": item.url, "count": outcome.valid.len() }),
                    )
                    .await;
                let mut leads = self.leads.lock().await;
                leads.extend(outcome.valid);
            }
        }

        if item.depth == 0 {
            if let Some(info) = self.extractor.extract_company_info(html, &item.url) {
                let info = self.transformer.transform_company_info(info);
                let mut company = self.company.lock().await;
                if company.is_none() {
                    *company = Some(info);
                }
            }
        }

        if self.job.strategy != CrawlStrategy::Single && item.depth < self.job.max_depth {
            let links = extract_links(html, &item.url);
            if !links.is_empty() {
                let child_depth = item.depth + 1;
                let added = self
                    .queue
                    .add_batch(
                        &links,
                        AddOptions {
                            priority: (SEED_PRIORITY - child_depth as i32).max(0),
                            depth: child_depth,
                            parent_url: Some(item.url.clone()),
                        },
                    )
                    .await;
                debug!("Discovered {} links on {}, queued {}", links.len(), item.url, added);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::fetcher::FetchedPage;

    struct MockFetcher {
        pages: HashMap<String, String>,
        fetches: AtomicUsize,
    }

    impl MockFetcher {
        fn new(pages: Vec<(&str, &str)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(u, b)| (u.to_string(), b.to_string()))
                    .collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(url) {
                Some(body) => Ok(FetchedPage {
                    url: url.to_string(),
                    status: 200,
                    headers: HeaderMap::new(),
                    body: body.clone(),
                }),
                None => Err(ScraperError::Http {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    fn job(start: &str) -> CrawlJob {
        CrawlJob {
            start_url: start.to_string(),
            delay_ms: 0,
            ..CrawlJob::default()
        }
    }

    #[tokio::test]
    async fn single_page_crawl_extracts_leads() {
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "https://acme.com/team",
            "<html><body>John Doe, CEO, john@acme.com, +1-555-123-4567</body></html>",
        )]));
        let crawler = LeadCrawler::with_fetcher(&Config::default(), fetcher);

        let mut job = job("https://acme.com/team");
        job.strategy = CrawlStrategy::Single;
        let report = crawler.run(job).await.unwrap();

        assert_eq!(report.pages_crawled, 1);
        assert_eq!(report.leads.len(), 1);
        let lead = &report.leads[0];
        assert_eq!(lead.name, "John Doe");
        assert_eq!(lead.email.as_deref(), Some("john@acme.com"));
        assert!(report.failed_urls.is_empty());
    }

    #[tokio::test]
    async fn breadth_crawl_follows_same_domain_links() {
        let fetcher = Arc::new(MockFetcher::new(vec![
            (
                "https://acme.com/",
                r#"<html><body>Welcome to Acme.
                   <a href="/team">Team</a>
                   <a href="https://elsewhere.com/page">External</a>
                   </body></html>"#,
            ),
            (
                "https://acme.com/team",
                "<html><body>Jane Smith, CTO, jane@acme.com</body></html>",
            ),
        ]));
        let crawler = LeadCrawler::with_fetcher(&Config::default(), fetcher.clone());

        let report = crawler.run(job("https://acme.com/")).await.unwrap();

        assert_eq!(report.pages_crawled, 2);
        assert!(report.leads.iter().any(|l| l.name == "Jane Smith"));
        // The off-domain link never left the frontier.
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_page_lands_in_failed_urls() {
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "https://acme.com/",
            r#"<html><body><a href="/gone">Gone</a></body></html>"#,
        )]));
        let crawler = LeadCrawler::with_fetcher(&Config::default(), fetcher.clone());

        let report = crawler.run(job("https://acme.com/")).await.unwrap();

        assert_eq!(report.pages_crawled, 1);
        assert_eq!(report.failed_urls.len(), 1);
        assert_eq!(report.failed_urls[0].0, "https://acme.com/gone");
        // 404 is not retryable, so the URL was fetched exactly once.
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn page_budget_caps_the_crawl() {
        let mut pages = vec![(
            "https://acme.com/".to_string(),
            r#"<html><body>
               <a href="/p1">1</a><a href="/p2">2</a><a href="/p3">3</a>
               <a href="/p4">4</a><a href="/p5">5</a>
               </body></html>"#
                .to_string(),
        )];
        for i in 1..=5 {
            pages.push((
                format!("https://acme.com/p{}", i),
                "<html><body>nothing here</body></html>".to_string(),
            ));
        }
        let fetcher = Arc::new(MockFetcher::new(
            pages.iter().map(|(u, b)| (u.as_str(), b.as_str())).collect(),
        ));
        let crawler = LeadCrawler::with_fetcher(&Config::default(), fetcher);

        let mut job = job("https://acme.com/");
        job.max_pages = 3;
        let report = crawler.run(job).await.unwrap();

        assert_eq!(report.pages_crawled, 3);
    }

    #[tokio::test]
    async fn company_info_comes_from_the_seed_page() {
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "https://acme.com/",
            "<html><head><title>Acme Corp - Industrial Software</title></head>\
             <body>Acme Corp builds software.\nLocation: Austin\n</body></html>",
        )]));
        let crawler = LeadCrawler::with_fetcher(&Config::default(), fetcher);

        let mut job = job("https://acme.com/");
        job.strategy = CrawlStrategy::Single;
        let report = crawler.run(job).await.unwrap();

        let company = report.company.expect("company info");
        assert_eq!(company.domain, "acme.com");
        assert!(company.name.to_lowercase().contains("acme"));
    }

    #[tokio::test]
    async fn invalid_start_url_is_rejected() {
        let fetcher = Arc::new(MockFetcher::new(vec![]));
        let crawler = LeadCrawler::with_fetcher(&Config::default(), fetcher);
        assert!(crawler.run(job("not a url")).await.is_err());
    }

    #[tokio::test]
    async fn depth_limit_stops_link_discovery() {
        let fetcher = Arc::new(MockFetcher::new(vec![
            (
                "https://acme.com/",
                r#"<html><body><a href="/l1">next</a></body></html>"#,
            ),
            (
                "https://acme.com/l1",
                r#"<html><body><a href="/l2">next</a></body></html>"#,
            ),
            (
                "https://acme.com/l2",
                r#"<html><body><a href="/l3">next</a></body></html>"#,
            ),
            ("https://acme.com/l3", "<html><body>deep</body></html>"),
        ]));
        let crawler = LeadCrawler::with_fetcher(&Config::default(), fetcher);

        let mut job = job("https://acme.com/");
        job.max_depth = 2;
        let report = crawler.run(job).await.unwrap();

        // Depths 0, 1 and 2 are fetched; the depth-3 link is never queued.
        assert_eq!(report.pages_crawled, 3);
    }
}
