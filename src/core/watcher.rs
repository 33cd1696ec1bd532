//! Change feed watcher
//!
//! Follows one table's change feed for the life of the process:
//!
//! ```text
//! Starting -> Streaming -> { Streaming, Reconnecting } -> Closed
//! ```
//!
//! A disconnect is followed by health probes at a fixed delay until the backend
//! answers, then the feed is reopened. Any other error reopens the feed after the
//! same delay. There is no attempt limit. The old handle is always closed before a
//! new one is opened.
//!
//! On reopen the feed resumes after the last resume token the watcher has seen.
//! Before the first token it starts from "now", so changes made while no feed was
//! open are not replayed.

use crate::adapters::database::{ChangeEvent, ChangeFeed, ChangeFeedSource, FeedError, ResumePoint};
use crate::core::shutdown::{is_shutdown, sleep_or_shutdown, wait_for_shutdown};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Pause between polls that returned no event
const IDLE_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Streaming,
    Reconnecting,
    Closed,
}

/// Live counters, readable while the watcher runs
#[derive(Debug, Default)]
pub struct WatcherMetrics {
    feeds_opened: AtomicU64,
    feeds_closed: AtomicU64,
    open_failures: AtomicU64,
    feed_errors: AtomicU64,
    probe_failures: AtomicU64,
    events: AtomicU64,
}

/// Point-in-time copy of [`WatcherMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub feeds_opened: u64,
    pub feeds_closed: u64,
    pub open_failures: u64,
    pub feed_errors: u64,
    pub probe_failures: u64,
    pub events: u64,
}

impl WatcherMetrics {
    pub fn snapshot(&self) -> WatcherStats {
        WatcherStats {
            feeds_opened: self.feeds_opened.load(Ordering::Relaxed),
            feeds_closed: self.feeds_closed.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            feed_errors: self.feed_errors.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ChangeFeedWatcher {
    source: Arc<dyn ChangeFeedSource>,
    table: String,
    retry_delay: Duration,
    shutdown: watch::Receiver<bool>,
    state: WatcherState,
    resume: Option<ResumePoint>,
    metrics: Arc<WatcherMetrics>,
}

impl ChangeFeedWatcher {
    pub fn new(
        source: Arc<dyn ChangeFeedSource>,
        table: impl Into<String>,
        retry_delay: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            table: table.into(),
            retry_delay,
            shutdown,
            state: WatcherState::Starting,
            resume: None,
            metrics: Arc::new(WatcherMetrics::default()),
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn metrics(&self) -> Arc<WatcherMetrics> {
        self.metrics.clone()
    }

    /// Last resume point seen on any feed
    pub fn resume_point(&self) -> Option<&ResumePoint> {
        self.resume.as_ref()
    }

    fn transition(&mut self, next: WatcherState) {
        if self.state != next {
            tracing::debug!(table = %self.table, from = ?self.state, to = ?next, "Watcher state change");
            self.state = next;
        }
    }

    /// Streams events into `on_event` until shutdown
    ///
    /// Each event is handled to completion before the next one is read.
    pub async fn run<F, Fut>(&mut self, mut on_event: F)
    where
        F: FnMut(ChangeEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        self.transition(WatcherState::Starting);
        tracing::info!(table = %self.table, "Change feed watcher starting");
        let mut feed: Option<Box<dyn ChangeFeed>> = None;

        loop {
            if is_shutdown(&self.shutdown) {
                break;
            }

            let Some(active) = feed.as_mut() else {
                match self.source.open_feed(&self.table, self.resume.clone()).await {
                    Ok(opened) => {
                        WatcherMetrics::bump(&self.metrics.feeds_opened);
                        feed = Some(opened);
                        self.transition(WatcherState::Streaming);
                    }
                    Err(e) => {
                        WatcherMetrics::bump(&self.metrics.open_failures);
                        tracing::warn!(table = %self.table, error = %e, "Failed to open change feed");
                        self.transition(WatcherState::Reconnecting);
                        if !self.recover(&e).await {
                            break;
                        }
                    }
                }
                continue;
            };

            let next = tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => None,
                result = active.next_event() => Some(result),
            };
            let token = active.resume_token();

            match next {
                None => break,
                Some(Ok(Some(event))) => {
                    if token.is_some() {
                        self.resume = token;
                    }
                    WatcherMetrics::bump(&self.metrics.events);
                    on_event(event).await;
                }
                Some(Ok(None)) => {
                    if token.is_some() {
                        self.resume = token;
                    }
                    if sleep_or_shutdown(&mut self.shutdown, IDLE_POLL).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    WatcherMetrics::bump(&self.metrics.feed_errors);
                    tracing::warn!(table = %self.table, error = %e, "Change feed error, reconnecting");
                    if let Some(old) = feed.take() {
                        old.close().await;
                        WatcherMetrics::bump(&self.metrics.feeds_closed);
                    }
                    self.transition(WatcherState::Reconnecting);
                    if !self.recover(&e).await {
                        break;
                    }
                }
            }
        }

        if let Some(old) = feed.take() {
            old.close().await;
            WatcherMetrics::bump(&self.metrics.feeds_closed);
        }
        self.transition(WatcherState::Closed);
        tracing::info!(table = %self.table, "Change feed watcher closed");
    }

    /// Waits out an error before the next open; false when shutdown interrupted it
    async fn recover(&mut self, error: &FeedError) -> bool {
        match error {
            FeedError::Disconnected(_) => self.wait_until_healthy().await,
            FeedError::Other(_) => !sleep_or_shutdown(&mut self.shutdown, self.retry_delay).await,
        }
    }

    async fn wait_until_healthy(&mut self) -> bool {
        loop {
            if sleep_or_shutdown(&mut self.shutdown, self.retry_delay).await {
                return false;
            }
            match self.source.ping().await {
                Ok(()) => {
                    tracing::info!(table = %self.table, "Backend healthy again, reopening change feed");
                    return true;
                }
                Err(e) => {
                    WatcherMetrics::bump(&self.metrics.probe_failures);
                    tracing::warn!(
                        table = %self.table,
                        error = %e,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "Health probe failed"
                    );
                }
            }
        }
    }
}
