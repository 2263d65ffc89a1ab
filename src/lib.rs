pub mod config;
pub mod crawler;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod frontier;
pub mod limiter;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod webhook;

pub use config::{load_config, Config};
pub use crawler::LeadCrawler;
pub use error::{Result, ScraperError};
pub use export::{ExportFormat, ExportManager, ExportOptions};
pub use frontier::QueueManager;
pub use limiter::RateLimiter;
pub use models::{CrawlJob, CrawlReport, ExtractedLead};
pub use pipeline::{LeadExtractor, LeadTransformer, LeadValidator};
pub use retry::RetryHandler;
pub use webhook::WebhookManager;
