use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::models::{CrawlJob, ItemStatus, QueueItem, QueueStatistics, QueueStatus};

/// Lifecycle events emitted by the frontier. Consumers register a bounded
/// channel via `subscribe`; there is no global emitter.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    ItemAdded(QueueItem),
    ItemStarted(QueueItem),
    ItemCompleted(String),
    ItemFailed { url: String, error: String },
    ItemRetrying(QueueItem),
    QueuePaused,
    QueueResumed,
    QueueCleared,
    QueueComplete,
}

/// Options for admitting a URL.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub priority: i32,
    pub depth: u32,
    pub parent_url: Option<String>,
}

/// Max-heap entry. Higher priority pops first; equal priorities pop FIFO
/// via the monotonic sequence number.
struct HeapEntry {
    priority: i32,
    seq: u64,
    item: QueueItem,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct FrontierState {
    pending: BinaryHeap<HeapEntry>,
    next_seq: u64,
    processing: HashMap<String, QueueItem>,
    completed: HashSet<String>,
    failed: HashMap<String, String>,
    visited: HashSet<String>,
    admitted: usize,
    paused: bool,
    start_time: Option<Instant>,
    subscribers: Vec<mpsc::Sender<QueueEvent>>,
}

impl FrontierState {
    fn emit(&mut self, event: QueueEvent) {
        // Slow subscribers drop events rather than stalling the crawl.
        self.subscribers
            .retain(|tx| !matches!(tx.try_send(event.clone()), Err(mpsc::error::TrySendError::Closed(_))));
    }

    fn enqueue(&mut self, item: QueueItem) {
        let entry = HeapEntry {
            priority: item.priority,
            seq: self.next_seq,
            item,
        };
        self.next_seq += 1;
        self.pending.push(entry);
    }

    fn is_complete(&self) -> bool {
        self.pending.is_empty()
            && self.processing.is_empty()
            && (self.completed.len() + self.failed.len()) > 0
    }

    fn average_processing_time_ms(&self) -> f64 {
        if self.completed.is_empty() {
            return 5000.0; // default estimate before any page finishes
        }
        let runtime = self
            .start_time
            .map(|t| t.elapsed().as_millis() as f64)
            .unwrap_or(0.0);
        runtime / self.completed.len() as f64
    }
}

/// Priority-ordered URL frontier with visited tracking, depth/page/domain
/// filtering and completion detection.
pub struct QueueManager {
    job: CrawlJob,
    start_host: Option<String>,
    state: Mutex<FrontierState>,
}

impl QueueManager {
    pub fn new(job: CrawlJob) -> Self {
        let start_host = host_of(&job.start_url);
        Self {
            job,
            start_host,
            state: Mutex::new(FrontierState::default()),
        }
    }

    /// Register a bounded event channel. Events are dropped for subscribers
    /// that fall behind; a closed receiver unsubscribes itself.
    pub async fn subscribe(&self, capacity: usize) -> mpsc::Receiver<QueueEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.state.lock().await.subscribers.push(tx);
        rx
    }

    /// Admit a URL unless it was already attempted, fails the job filters,
    /// exceeds the depth limit, or the job's page budget is spent.
    ///
    /// The URL is marked visited before filtering, so once attempted it is
    /// never re-admitted.
    pub async fn add_to_queue(&self, url: &str, options: AddOptions) -> bool {
        let mut state = self.state.lock().await;

        if state.visited.contains(url) {
            return false;
        }
        state.visited.insert(url.to_string());

        if !self.should_crawl(url) {
            return false;
        }
        if options.depth > self.job.max_depth {
            return false;
        }
        if state.admitted >= self.job.max_pages {
            return false;
        }

        let item = QueueItem {
            url: url.to_string(),
            priority: options.priority,
            depth: options.depth,
            parent_url: options.parent_url,
            retries: 0,
            status: ItemStatus::Pending,
            added_at: Utc::now(),
            processed_at: None,
            error: None,
        };

        state.admitted += 1;
        state.emit(QueueEvent::ItemAdded(item.clone()));
        state.enqueue(item);
        debug!("Queued {} (pending: {})", url, state.pending.len());
        true
    }

    pub async fn add_batch(&self, urls: &[String], options: AddOptions) -> usize {
        let mut added = 0;
        for url in urls {
            if self.add_to_queue(url, options.clone()).await {
                added += 1;
            }
        }
        added
    }

    /// Highest-priority pending item, or `None` when paused, the concurrency
    /// cap is reached, or nothing is pending. The item moves to `processing`.
    pub async fn get_next(&self) -> Option<QueueItem> {
        let mut state = self.state.lock().await;

        if state.paused || state.processing.len() >= self.job.concurrency {
            return None;
        }

        let entry = state.pending.pop()?;
        let mut item = entry.item;
        item.status = ItemStatus::Processing;
        item.processed_at = Some(Utc::now());

        if state.start_time.is_none() {
            state.start_time = Some(Instant::now());
        }
        state.processing.insert(item.url.clone(), item.clone());
        state.emit(QueueEvent::ItemStarted(item.clone()));
        Some(item)
    }

    /// Non-suspending alias for `get_next`, for callers that poll.
    pub async fn try_next(&self) -> Option<QueueItem> {
        self.get_next().await
    }

    /// Pull-based stream: suspends until an item is available and returns
    /// `None` once the queue is complete.
    pub async fn next_item(&self) -> Option<QueueItem> {
        loop {
            {
                let state = self.state.lock().await;
                if state.is_complete() {
                    return None;
                }
            }
            if let Some(item) = self.get_next().await {
                return Some(item);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn mark_completed(&self, url: &str) {
        let mut state = self.state.lock().await;
        state.processing.remove(url);
        state.completed.insert(url.to_string());
        state.emit(QueueEvent::ItemCompleted(url.to_string()));
        if state.is_complete() {
            state.emit(QueueEvent::QueueComplete);
        }
    }

    /// On failure with retries left the item is re-enqueued demoted by one
    /// priority step; otherwise it is recorded as permanently failed.
    pub async fn mark_failed(&self, url: &str, error: &str, retry: bool) {
        let mut state = self.state.lock().await;
        let item = state.processing.remove(url);

        if retry {
            if let Some(mut item) = item {
                if item.retries < 3 {
                    item.retries += 1;
                    item.status = ItemStatus::Pending;
                    item.error = Some(error.to_string());
                    item.priority -= 1;
                    state.emit(QueueEvent::ItemRetrying(item.clone()));
                    state.enqueue(item);
                    return;
                }
            }
        }

        state.failed.insert(url.to_string(), error.to_string());
        state.emit(QueueEvent::ItemFailed {
            url: url.to_string(),
            error: error.to_string(),
        });
        if state.is_complete() {
            state.emit(QueueEvent::QueueComplete);
        }
    }

    /// Stop handing out new work. In-flight items run to completion.
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        state.paused = true;
        state.emit(QueueEvent::QueuePaused);
    }

    pub async fn resume(&self) {
        let mut state = self.state.lock().await;
        state.paused = false;
        if state.start_time.is_none() {
            state.start_time = Some(Instant::now());
        }
        state.emit(QueueEvent::QueueResumed);
    }

    /// Discard all pending/processing state immediately.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.processing.clear();
        state.completed.clear();
        state.failed.clear();
        state.visited.clear();
        state.admitted = 0;
        state.start_time = None;
        state.emit(QueueEvent::QueueCleared);
    }

    pub async fn is_complete(&self) -> bool {
        self.state.lock().await.is_complete()
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        let avg = state.average_processing_time_ms();
        QueueStatus {
            pending: state.pending.len(),
            processing: state.processing.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
            total_urls: state.visited.len(),
            average_processing_time_ms: avg,
            estimated_time_remaining_ms: state.pending.len() as f64 * avg,
        }
    }

    pub async fn statistics(&self) -> QueueStatistics {
        let state = self.state.lock().await;
        let avg = state.average_processing_time_ms();
        let runtime_ms = state
            .start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let finished = state.completed.len() + state.failed.len();
        let throughput = if runtime_ms > 0 {
            state.completed.len() as f64 / (runtime_ms as f64 / 1000.0)
        } else {
            0.0
        };
        let success_rate = if finished > 0 {
            state.completed.len() as f64 / finished as f64 * 100.0
        } else {
            0.0
        };
        QueueStatistics {
            status: QueueStatus {
                pending: state.pending.len(),
                processing: state.processing.len(),
                completed: state.completed.len(),
                failed: state.failed.len(),
                total_urls: state.visited.len(),
                average_processing_time_ms: avg,
                estimated_time_remaining_ms: state.pending.len() as f64 * avg,
            },
            runtime_ms,
            throughput_per_sec: throughput,
            success_rate,
            failed_urls: state
                .failed
                .iter()
                .map(|(u, e)| (u.clone(), e.clone()))
                .collect(),
            processing_urls: state.processing.keys().cloned().collect(),
        }
    }

    fn should_crawl(&self, url: &str) -> bool {
        let filters = &self.job.filters;

        if filters.same_domain_only {
            if host_of(url) != self.start_host {
                return false;
            }
        }
        if !filters.include_patterns.is_empty()
            && !filters.include_patterns.iter().any(|p| url.contains(p))
        {
            return false;
        }
        if filters.exclude_patterns.iter().any(|p| url.contains(p)) {
            return false;
        }
        true
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}
