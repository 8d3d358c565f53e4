//! Serializing passes and cancelling them when sources change underneath.
//!
//! Only one pass runs at a time in the whole process; [`CompileScheduler::run`]
//! blocks on a global lock. Source mutations are counted by a
//! [`ModificationTracker`]. A pass holds a [`ReadToken`] taken at its start and
//! calls [`ReadToken::checkpoint`] between phases; once the tracker has moved
//! on, a preemptible token turns the next checkpoint into
//! [`PassError::Cancelled`], the pass drops everything it computed, and the
//! scheduler runs it again from scratch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use livepatch_config::{PolicyKind, SchedulerConfig};

use crate::error::PassError;

static PASS_LOCK: Mutex<()> = Mutex::new(());

const NEVER: u64 = u64::MAX;

/// Points inside a pass where a stale token aborts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// After the front-end compiler returned.
    PostCompile,
    /// Before comparing against the cache.
    PreDiff,
    /// Before validating a class.
    PreValidate,
}

/// Counts source mutations.
///
/// Cloning shares the counter, so editors can hold a clone and call
/// [`bump`](Self::bump) from any thread.
#[derive(Debug, Clone)]
pub struct ModificationTracker {
    state: Arc<TrackerState>,
}

#[derive(Debug)]
struct TrackerState {
    stamp: AtomicU64,
    epoch: Instant,
    last_change_ms: AtomicU64,
}

impl Default for ModificationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ModificationTracker {
    /// Creates a tracker that has seen no mutation.
    pub fn new() -> Self {
        Self {
            state: Arc::new(TrackerState {
                stamp: AtomicU64::new(0),
                epoch: Instant::now(),
                last_change_ms: AtomicU64::new(NEVER),
            }),
        }
    }

    /// Records a source mutation.
    pub fn bump(&self) {
        let now = self.state.epoch.elapsed().as_millis() as u64;
        self.state.last_change_ms.store(now, Ordering::SeqCst);
        self.state.stamp.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of mutations so far.
    pub fn stamp(&self) -> u64 {
        self.state.stamp.load(Ordering::SeqCst)
    }

    /// Time since the last mutation; [`Duration::MAX`] if there was none.
    pub fn quiet_for(&self) -> Duration {
        match self.state.last_change_ms.load(Ordering::SeqCst) {
            NEVER => Duration::MAX,
            last => {
                let now = self.state.epoch.elapsed().as_millis() as u64;
                Duration::from_millis(now.saturating_sub(last))
            }
        }
    }

    /// Takes a token pinned to the current stamp.
    pub fn read_token(&self, preemptible: bool) -> ReadToken {
        ReadToken {
            tracker: self.clone(),
            stamp: self.stamp(),
            preemptible,
        }
    }
}

/// Read access to the sources for the duration of one pass attempt.
#[derive(Debug)]
pub struct ReadToken {
    tracker: ModificationTracker,
    stamp: u64,
    preemptible: bool,
}

impl ReadToken {
    /// Returns `true` if a mutation happened after the token was taken.
    pub fn is_stale(&self) -> bool {
        self.tracker.stamp() != self.stamp
    }

    /// Returns `true` if mutations cancel the pass holding this token.
    pub fn is_preemptible(&self) -> bool {
        self.preemptible
    }

    /// Fails with [`PassError::Cancelled`] if the pass must be abandoned.
    pub fn checkpoint(&self, at: Checkpoint) -> Result<(), PassError> {
        if self.preemptible && self.is_stale() {
            tracing::debug!(checkpoint = ?at, "sources changed during pass");
            return Err(PassError::Cancelled);
        }
        Ok(())
    }
}

/// How a pass is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPolicy {
    /// Wait until sources were quiet for `quiet_period`, run preemptibly, and
    /// start over after a cancellation, at most `max_retries` times.
    Automatic {
        /// Required time without mutations.
        quiet_period: Duration,
        /// Retries after the first attempt.
        max_retries: u32,
        /// How often the quiet period is re-checked.
        poll_interval: Duration,
    },
    /// Run once, immediately, never cancelled.
    Manual,
}

impl InvocationPolicy {
    /// The policy selected in the configuration.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        match config.policy {
            PolicyKind::Automatic => InvocationPolicy::Automatic {
                quiet_period: config.quiet_period(),
                max_retries: config.max_retries,
                poll_interval: config.poll_interval(),
            },
            PolicyKind::Manual => InvocationPolicy::Manual,
        }
    }
}

/// Runs passes one at a time.
#[derive(Debug, Clone, Default)]
pub struct CompileScheduler {
    tracker: ModificationTracker,
}

impl CompileScheduler {
    /// Creates a scheduler with a fresh tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracker whose mutations cancel passes.
    pub fn tracker(&self) -> &ModificationTracker {
        &self.tracker
    }

    /// Runs `pass` under the global lock according to `policy`.
    ///
    /// `pass` must have no side effects before it returns `Ok`; a cancelled
    /// attempt is simply run again.
    pub fn run<T, F>(&self, policy: &InvocationPolicy, mut pass: F) -> Result<T, PassError>
    where
        F: FnMut(&ReadToken) -> Result<T, PassError>,
    {
        match *policy {
            InvocationPolicy::Manual => {
                let _guard = lock();
                pass(&self.tracker.read_token(false))
            }
            InvocationPolicy::Automatic {
                quiet_period,
                max_retries,
                poll_interval,
            } => {
                for attempt in 0..=max_retries {
                    self.wait_for_quiet(quiet_period, poll_interval);
                    let _guard = lock();
                    match pass(&self.tracker.read_token(true)) {
                        Err(PassError::Cancelled) => {
                            tracing::debug!(attempt, "pass cancelled; retrying");
                        }
                        result => return result,
                    }
                }
                tracing::warn!(max_retries, "sources kept changing; giving up");
                Err(PassError::Cancelled)
            }
        }
    }

    fn wait_for_quiet(&self, quiet_period: Duration, poll_interval: Duration) {
        loop {
            let quiet = self.tracker.quiet_for();
            if quiet >= quiet_period {
                return;
            }
            thread::sleep(poll_interval.min(quiet_period - quiet));
        }
    }
}

/// A poisoned lock only means an earlier pass panicked; passes share no state
/// through it.
fn lock() -> MutexGuard<'static, ()> {
    PASS_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
