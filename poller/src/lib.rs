//! Review poller: fetches every configured app on a fixed interval.
//!
//! Polls once on start and then on every tick. Each cycle fans out one
//! task per app and waits for all of them before the next tick is taken.
//! A failing app is logged and retried on the next cycle; it never
//! affects the other apps.

pub mod feed;
pub mod fetcher;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use common::review::Review;
use common::store::ReviewStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub use fetcher::{ItunesFetcher, ReviewFetcher};

/// Where fetched batches go. Implemented by [`ReviewStore`].
pub trait ReviewSink: Send + Sync {
    fn upsert(&self, batch: Vec<Review>) -> Result<()>;
}

impl ReviewSink for ReviewStore {
    fn upsert(&self, batch: Vec<Review>) -> Result<()> {
        ReviewStore::upsert(self, batch)?;
        Ok(())
    }
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct Shared {
    sink: Arc<dyn ReviewSink>,
    fetcher: Arc<dyn ReviewFetcher>,
    app_ids: Vec<String>,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Poller {
    shared: Arc<Shared>,
    interval: Duration,
    /// `Some` while the control loop is alive.
    running: Mutex<Option<Running>>,
}

impl Poller {
    pub fn new(
        sink: Arc<dyn ReviewSink>,
        fetcher: Arc<dyn ReviewFetcher>,
        app_ids: Vec<String>,
        interval: Duration,
    ) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, "Poll interval too small, using {:?}", MIN_INTERVAL);
        }

        Self {
            shared: Arc::new(Shared {
                sink,
                fetcher,
                app_ids,
            }),
            interval: interval.max(MIN_INTERVAL),
            running: Mutex::new(None),
        }
    }

    pub fn app_ids(&self) -> &[String] {
        &self.shared.app_ids
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawn the control loop. A no-op if it is already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Poller already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.shared), self.interval, stop_rx));
        *running = Some(Running { stop_tx, handle });

        info!(
            apps = self.shared.app_ids.len(),
            interval_secs = self.interval.as_secs_f64(),
            "Poller started"
        );
    }

    /// Signal the control loop and wait for it to exit, including any
    /// cycle in flight. Returns at once if the poller is not running.
    ///
    /// The poller stays in the running state until the loop has been joined,
    /// so a `stop()` dropped part way leaves it to the next `stop()` to finish.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(current) = running.as_mut() else {
            return;
        };

        current.stop_tx.send_replace(true);
        if let Err(e) = (&mut current.handle).await {
            error!("Poller loop ended abnormally: {}", e);
        }
        *running = None;
        info!("Poller stopped");
    }

    /// Run one full cycle over every app.
    pub async fn poll_all(&self) {
        self.shared.poll_all().await;
    }
}

async fn run_loop(shared: Arc<Shared>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    // First cycle runs immediately; the ticker starts one period later.
    shared.poll_all().await;

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => shared.poll_all().await,
        }
    }

    debug!("Poller loop exited");
}

impl Shared {
    async fn poll_all(self: &Arc<Self>) {
        info!("Polling all apps concurrently...");
        let start = Instant::now();

        let handles: Vec<JoinHandle<()>> = self
            .app_ids
            .iter()
            .map(|app_id| {
                let shared = Arc::clone(self);
                let app_id = app_id.clone();
                tokio::spawn(async move {
                    match shared.fetch_and_store(&app_id).await {
                        Ok(()) => info!(app_id = %app_id, "Successfully polled app"),
                        Err(e) => error!(app_id = %app_id, "Error polling app: {:#}", e),
                    }
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Poll task failed to complete: {}", e);
            }
        }

        info!(
            apps = self.app_ids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Poll complete"
        );
    }

    async fn fetch_and_store(&self, app_id: &str) -> Result<()> {
        info!(app_id = %app_id, "Fetching reviews");
        let reviews = self.fetcher.fetch_reviews(app_id).await?;

        if reviews.is_empty() {
            info!(app_id = %app_id, "No reviews found for app");
            return Ok(());
        }

        let count = reviews.len();
        self.sink.upsert(reviews).context("failed to store reviews")?;
        info!(app_id = %app_id, count, "Stored reviews");
        Ok(())
    }
}
