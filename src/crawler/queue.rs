//! Crawl task queue and dispatcher
//!
//! This module handles:
//! - Fire-and-forget enqueueing of crawl tasks
//! - Per-run de-duplication of locators
//! - Bounding the number of concurrent visits
//! - Detecting the end of a run (queue drained, nothing in flight)

use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// A request to visit one wiki locator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrawlTask {
    pub locator: String,
}

impl CrawlTask {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
        }
    }
}

/// Accepts crawl tasks without waiting for them to run
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: CrawlTask);
}

/// Task queue backed by an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<CrawlTask>,
}

impl ChannelQueue {
    /// Creates a queue and the receiver a `Dispatcher` drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CrawlTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TaskQueue for ChannelQueue {
    fn enqueue(&self, task: CrawlTask) {
        if let Err(e) = self.tx.send(task) {
            tracing::debug!("Dropping task for {}: dispatcher stopped", e.0.locator);
        }
    }
}

/// Counters of one dispatch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Tasks handed to a worker
    pub dispatched: u64,
    /// Tasks dropped because their locator was already dispatched
    pub duplicates: u64,
    /// Workers that panicked
    pub panicked: u64,
}

/// Runs queued tasks on at most `workers` concurrent tokio tasks
///
/// A locator is dispatched at most once per run. The run ends when the
/// queue is empty and no task is in flight; tasks only enqueue while
/// running, so nothing can arrive after that point.
pub struct Dispatcher {
    workers: usize,
    rx: mpsc::UnboundedReceiver<CrawlTask>,
    seen: HashSet<String>,
    progress_every: u64,
}

impl Dispatcher {
    /// Creates a dispatcher draining `rx`
    pub fn new(workers: usize, rx: mpsc::UnboundedReceiver<CrawlTask>) -> Self {
        Self {
            workers: workers.max(1),
            rx,
            seen: HashSet::new(),
            progress_every: 25,
        }
    }

    /// Drains the queue, running `handler` for each distinct task
    pub async fn run<H, Fut>(mut self, mut handler: H) -> DispatchStats
    where
        H: FnMut(CrawlTask) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = JoinSet::new();
        let mut stats = DispatchStats::default();
        let mut finished = 0u64;
        let start_time = Instant::now();

        loop {
            while in_flight.len() < self.workers {
                match self.rx.try_recv() {
                    Ok(task) => self.dispatch(task, &mut in_flight, &mut handler, &mut stats),
                    Err(_) => break,
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let has_capacity = in_flight.len() < self.workers;
            tokio::select! {
                Some(joined) = in_flight.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("Crawl task failed to complete: {}", e);
                        stats.panicked += 1;
                    }
                    finished += 1;

                    if finished % self.progress_every == 0 {
                        let rate = finished as f64 / start_time.elapsed().as_secs_f64();
                        tracing::info!(
                            "Progress: {} visits finished, {} in flight, {:.2} visits/sec",
                            finished,
                            in_flight.len(),
                            rate
                        );
                    }
                }
                Some(task) = self.rx.recv(), if has_capacity => {
                    self.dispatch(task, &mut in_flight, &mut handler, &mut stats);
                }
            }
        }

        tracing::debug!(
            "Dispatcher drained: {} dispatched, {} duplicates in {:?}",
            stats.dispatched,
            stats.duplicates,
            start_time.elapsed()
        );
        stats
    }

    fn dispatch<H, Fut>(
        &mut self,
        task: CrawlTask,
        in_flight: &mut JoinSet<()>,
        handler: &mut H,
        stats: &mut DispatchStats,
    ) where
        H: FnMut(CrawlTask) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.seen.insert(task.locator.clone()) {
            tracing::trace!("Already dispatched {}", task.locator);
            stats.duplicates += 1;
            return;
        }

        tracing::debug!("Dispatching {}", task.locator);
        in_flight.spawn(handler(task));
        stats.dispatched += 1;
    }
}
