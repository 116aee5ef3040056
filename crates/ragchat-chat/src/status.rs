//! Cached index status with stale-while-revalidate reads.
//!
//! `read()` never waits on the network: it returns whatever snapshot is
//! cached and, when that snapshot is missing, stale or invalidated, starts
//! one background refresh. Subscribers observe every stored snapshot.
//!
//! Every fetch takes a generation number when it starts. A result is stored
//! only if no later-started fetch has already been stored.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use ragchat_client::{RagBackend, StatusReply};
use ragchat_core::config::StatusConfig;
use ragchat_core::types::StatusSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shortest interval accepted by [`StatusPoller::spawn_polling`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct CacheState {
    snapshot: Option<StatusSnapshot>,
    invalidated: bool,
    /// Fetches started and not yet finished.
    in_flight: u32,
    /// Generation handed to the most recently started fetch.
    started_generation: u64,
    /// Generation of the stored snapshot; 0 when nothing is stored.
    stored_generation: u64,
}

impl CacheState {
    fn needs_refresh(&self, stale_after: chrono::Duration) -> bool {
        self.invalidated
            || self
                .snapshot
                .as_ref()
                .map_or(true, |s| s.is_older_than(stale_after))
    }

    fn begin_fetch(&mut self) -> u64 {
        self.in_flight += 1;
        self.invalidated = false;
        self.started_generation += 1;
        self.started_generation
    }
}

struct PollerShared {
    backend: Arc<dyn RagBackend>,
    stale_after: chrono::Duration,
    cache: Mutex<CacheState>,
    updates: watch::Sender<Option<StatusSnapshot>>,
}

/// Shared handle to the cached index status. Clones observe the same cache.
#[derive(Clone)]
pub struct StatusPoller {
    shared: Arc<PollerShared>,
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn RagBackend>, stale_after: Duration) -> Self {
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        let (updates, _) = watch::channel(None);
        Self {
            shared: Arc::new(PollerShared {
                backend,
                stale_after,
                cache: Mutex::new(CacheState::default()),
                updates,
            }),
        }
    }

    pub fn from_config(backend: Arc<dyn RagBackend>, config: &StatusConfig) -> Self {
        Self::new(backend, Duration::from_secs(config.stale_after_secs))
    }

    /// Return the cached snapshot without waiting.
    ///
    /// Starts a background refresh when the cache is empty, stale or
    /// invalidated and no fetch is already running.
    pub fn read(&self) -> Option<StatusSnapshot> {
        let (snapshot, generation) = {
            let mut cache = self.lock();
            let generation = (cache.needs_refresh(self.shared.stale_after)
                && cache.in_flight == 0)
                .then(|| cache.begin_fetch());
            (cache.snapshot.clone(), generation)
        };

        if let Some(generation) = generation {
            self.spawn_refresh(generation);
        }
        snapshot
    }

    /// Cached snapshot, without scheduling any refresh.
    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        self.lock().snapshot.clone()
    }

    /// Mark the cached snapshot stale so the next read refetches.
    pub fn invalidate(&self) {
        self.lock().invalidated = true;
        debug!("Status invalidated");
    }

    /// Whether the cached snapshot is missing, stale or invalidated.
    pub fn is_stale(&self) -> bool {
        self.lock().needs_refresh(self.shared.stale_after)
    }

    /// Receive every snapshot stored after subscribing.
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.shared.updates.subscribe()
    }

    /// Fetch the status now, regardless of staleness.
    ///
    /// Returns the newest stored snapshot, which is a later fetch's result
    /// when that one finished first.
    pub async fn refresh(&self) -> StatusSnapshot {
        let generation = self.lock().begin_fetch();
        self.fetch_and_store(generation).await
    }

    /// Refresh on a fixed interval until the handle is aborted.
    ///
    /// The first refresh happens immediately. Intervals shorter than
    /// [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn spawn_polling(&self, every: Duration) -> JoinHandle<()> {
        let every = if every < MIN_POLL_INTERVAL {
            warn!(requested_ms = every.as_millis() as u64, "Poll interval raised to minimum");
            MIN_POLL_INTERVAL
        } else {
            every
        };
        let poller = self.clone();
        tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "Status polling started");
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let snapshot = poller.refresh().await;
                debug!(chunk_count = snapshot.chunk_count, "Status polled");
            }
        })
    }

    // -- Private helpers --

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.shared
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_refresh(&self, generation: u64) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let poller = self.clone();
                handle.spawn(async move {
                    poller.fetch_and_store(generation).await;
                });
            }
            Err(_) => {
                warn!("No async runtime; status refresh skipped");
                let mut cache = self.lock();
                cache.in_flight = cache.in_flight.saturating_sub(1);
            }
        }
    }

    async fn fetch_and_store(&self, generation: u64) -> StatusSnapshot {
        let reply = self.shared.backend.get_status().await;
        let fetched = snapshot_from(reply);

        if fetched.success {
            debug!(generation, chunk_count = fetched.chunk_count, "Status refreshed");
        } else {
            warn!(generation, message = ?fetched.message, "Status refresh failed");
        }

        let (current, stored) = {
            let mut cache = self.lock();
            cache.in_flight = cache.in_flight.saturating_sub(1);
            if generation > cache.stored_generation {
                cache.stored_generation = generation;
                cache.snapshot = Some(fetched.clone());
                (fetched, true)
            } else {
                debug!(
                    generation,
                    stored = cache.stored_generation,
                    "Outdated status discarded"
                );
                let current = cache.snapshot.clone().unwrap_or(fetched);
                (current, false)
            }
        };

        if stored {
            self.shared.updates.send_replace(Some(current.clone()));
        }
        current
    }
}

fn snapshot_from(reply: StatusReply) -> StatusSnapshot {
    StatusSnapshot {
        chunk_count: reply.chunk_count,
        success: reply.success,
        message: reply.message,
        fetched_at: Utc::now(),
    }
}
