use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lead_harvester::config::{load_config, Config};
use lead_harvester::crawler::LeadCrawler;
use lead_harvester::error::{Result, ScraperError};
use lead_harvester::export::{ExportFormat, ExportManager, ExportOptions};
use lead_harvester::models::CrawlJob;

use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = match load_config("config.yml").await {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config.yml: {}. Using defaults.", e);
            Config::default()
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("lead_harvester={}", config.logging.level))),
        )
        .init();

    let start_url = std::env::args()
        .nth(1)
        .ok_or_else(|| ScraperError::Config("usage: lead-harvester <start-url> [max-pages]".to_string()))?;
    let max_pages = std::env::args()
        .nth(2)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(config.crawl.max_pages);

    tokio::fs::create_dir_all(&config.output.directory).await?;

    let job = CrawlJob {
        start_url,
        max_pages,
        max_depth: config.crawl.max_depth,
        concurrency: config.crawl.concurrency,
        delay_ms: config.crawl.delay_ms,
        filters: config.crawl.filters.clone(),
        ..CrawlJob::default()
    };

    let crawler = LeadCrawler::new(&config);

    let report = tokio::select! {
        result = crawler.run(job) => result?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            return Ok(());
        }
    };

    let exporter = ExportManager::new();
    let options = ExportOptions::default();
    let csv_path = exporter.write_to_file(
        &report.leads,
        ExportFormat::Csv,
        &options,
        &config.output.directory,
    )?;
    let json_path = exporter.write_to_file(
        &report.leads,
        ExportFormat::Json,
        &options,
        &config.output.directory,
    )?;

    info!("📦 Exported {} leads to {} and {}", report.leads.len(), csv_path.display(), json_path.display());
    info!("{}", exporter.generate_summary(&report.leads));
    if let Some(company) = &report.company {
        info!("🏢 Company: {} ({})", company.name, company.domain);
    }
    if !report.failed_urls.is_empty() {
        warn!("{} URLs failed:", report.failed_urls.len());
        for (url, error) in &report.failed_urls {
            warn!("  {} - {}", url, error);
        }
    }

    Ok(())
}
