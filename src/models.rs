use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Crawl strategy for a job. Only affects seed discovery; the frontier
/// treats all strategies the same once URLs are queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStrategy {
    Single,
    Breadth,
    Depth,
    Sitemap,
    Smart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlFilters {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub same_domain_only: bool,
}

impl Default for CrawlFilters {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            same_domain_only: true,
        }
    }
}

/// Immutable description of a crawl job. Owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub start_url: String,
    pub strategy: CrawlStrategy,
    pub max_pages: usize,
    pub max_depth: u32,
    pub filters: CrawlFilters,
    pub concurrency: usize,
    pub delay_ms: u64,
}

impl Default for CrawlJob {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            strategy: CrawlStrategy::Breadth,
            max_pages: 10,
            max_depth: 2,
            filters: CrawlFilters::default(),
            concurrency: 2,
            delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A URL admitted to the frontier. Mutated only by the queue manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub url: String,
    pub priority: i32,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub retries: u32,
    pub status: ItemStatus,
    pub added_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Entry,
    Mid,
    Senior,
    Executive,
}

/// A candidate business contact pulled out of page content.
///
/// `confidence` is a 0.0..=1.0 score of how complete the record looked at
/// extraction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLead {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub seniority: Option<Seniority>,
    pub confidence: f32,
    pub source_url: String,
    pub context: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedLead {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
            title: None,
            company: None,
            linkedin_url: None,
            location: None,
            department: None,
            seniority: None,
            confidence: 0.0,
            source_url: source_url.into(),
            context: None,
            extracted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialProfile {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub name: String,
    pub domain: String,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub location: Option<String>,
    pub founded: Option<String>,
    pub website: String,
    pub technologies: Vec<String>,
    pub services: Vec<String>,
    pub social_profiles: Vec<SocialProfile>,
}

/// Snapshot of frontier counters.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_urls: usize,
    pub average_processing_time_ms: f64,
    pub estimated_time_remaining_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatistics {
    #[serde(flatten)]
    pub status: QueueStatus,
    pub runtime_ms: u64,
    pub throughput_per_sec: f64,
    pub success_rate: f64,
    pub failed_urls: Vec<(String, String)>,
    pub processing_urls: Vec<String>,
}

/// Result of running one crawl job to completion.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub start_url: String,
    pub pages_crawled: usize,
    pub leads: Vec<ExtractedLead>,
    pub company: Option<CompanyInfo>,
    pub failed_urls: Vec<(String, String)>,
    pub duration_ms: u64,
}
