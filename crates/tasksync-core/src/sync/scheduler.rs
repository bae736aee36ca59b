//! Decides when sync sessions run.
//!
//! Three triggers feed one session at a time: a debounced trigger after
//! local edits, a periodic trigger, and explicit [`SyncScheduler::run_sync`]
//! calls. A session that is already running is never interrupted. Local
//! edits that arrive meanwhile queue one more sync once it finishes; other
//! triggers are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::session::SyncEngine;
use super::status::SyncReport;
use crate::error::Result;
use crate::state::SyncState;
use crate::store::{StoreChange, Subscription, LAST_SYNC_VERSION_KEY, TASKS_KEY};

/// Outcome of [`SyncScheduler::run_sync`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRun {
    Completed(SyncReport),
    /// Another session was in flight
    Skipped,
}

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    debounce: Duration,
    in_progress: AtomicBool,
    /// Task edits seen while a session was running
    edited_during_sync: AtomicBool,
    state: Mutex<SyncState>,
    pending: Mutex<Option<JoinHandle<()>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SyncScheduler {
    /// Scheduler using the engine's configured debounce
    pub fn new(engine: Arc<SyncEngine>) -> Arc<Self> {
        let debounce = engine.settings().debounce();
        Self::with_debounce(engine, debounce)
    }

    pub fn with_debounce(engine: Arc<SyncEngine>, debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            engine,
            debounce,
            in_progress: AtomicBool::new(false),
            edited_during_sync: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
            pending: Mutex::new(None),
            periodic: Mutex::new(None),
            subscription: Mutex::new(None),
        })
    }

    pub const fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Outcome of the latest session, or `Syncing` while one runs
    pub fn state(&self) -> SyncState {
        *lock(&self.state)
    }

    /// Request a sync after the debounce period, restarting any pending timer.
    pub fn queue(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, dropping queued sync");
            return;
        };

        let scheduler = Arc::downgrade(self);
        let delay = self.debounce;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.spawn_run("debounced");
            }
        });

        if let Some(previous) = lock(&self.pending).replace(timer) {
            previous.abort();
            debug!("Debounce timer restarted");
        }
    }

    /// Run a session every `interval`, replacing any previous periodic task.
    pub fn start_periodic(self: &Arc<Self>, interval: Duration) {
        if interval.is_zero() {
            warn!("Ignoring zero periodic sync interval");
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, periodic sync not started");
            return;
        };

        let scheduler = Arc::downgrade(self);
        let handle = runtime.spawn(periodic_loop(scheduler, interval));
        if let Some(previous) = lock(&self.periodic).replace(handle) {
            previous.abort();
        }
        debug!(interval_secs = interval.as_secs(), "Periodic sync started");
    }

    /// Run a session now unless one is already in flight.
    ///
    /// Task edits made while the session ran are queued afterwards.
    pub async fn run_sync(self: &Arc<Self>) -> Result<SyncRun> {
        let result = {
            let Some(_guard) = InProgressGuard::acquire(&self.in_progress) else {
                debug!("Sync already in progress, skipping");
                return Ok(SyncRun::Skipped);
            };
            self.edited_during_sync.store(false, Ordering::SeqCst);

            self.set_state(SyncState::Syncing);
            let result = self.engine.sync().await;
            self.set_state(if result.is_ok() {
                SyncState::Synced
            } else {
                SyncState::Error
            });
            result
        };

        if self.edited_during_sync.swap(false, Ordering::SeqCst) {
            debug!("Tasks changed during sync, queueing another");
            self.queue();
        }
        result.map(SyncRun::Completed)
    }

    /// Queue a sync whenever the task collection is edited.
    ///
    /// Writes of sync results are ignored, so a sync never triggers the next
    /// one. Edits made while a session runs are queued once it finishes.
    pub fn attach(self: &Arc<Self>) {
        let scheduler = Arc::downgrade(self);
        let subscription = self
            .engine
            .local_store()
            .on_change(Arc::new(move |change: &StoreChange| {
                if !change.touches(TASKS_KEY) || change.touches(LAST_SYNC_VERSION_KEY) {
                    return;
                }
                let Some(scheduler) = scheduler.upgrade() else {
                    return;
                };
                if scheduler.is_syncing() {
                    debug!("Task edit during sync, deferring");
                    scheduler.edited_during_sync.store(true, Ordering::SeqCst);
                    return;
                }
                scheduler.queue();
            }));
        *lock(&self.subscription) = Some(subscription);
    }

    /// Cancel the pending timer, the periodic task and the store subscription.
    ///
    /// A session already running finishes normally.
    pub fn stop(&self) {
        if let Some(timer) = lock(&self.pending).take() {
            timer.abort();
        }
        if let Some(periodic) = lock(&self.periodic).take() {
            periodic.abort();
        }
        lock(&self.subscription).take();
    }

    fn spawn_run(self: &Arc<Self>, trigger: &'static str) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            match scheduler.run_sync().await {
                Ok(SyncRun::Completed(_)) => debug!(trigger, "Triggered sync finished"),
                Ok(SyncRun::Skipped) => {}
                Err(error) => warn!(trigger, "Triggered sync failed: {error}"),
            }
        });
    }

    fn set_state(&self, state: SyncState) {
        *lock(&self.state) = state;
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn periodic_loop(scheduler: Weak<SyncScheduler>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(scheduler) = scheduler.upgrade() else {
            break;
        };
        scheduler.spawn_run("periodic");
    }
}

/// Holds the in-progress flag; releasing happens on every exit path.
struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InProgressGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
