use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::LimiterConfig;
use crate::metrics::metrics;

/// Name used when a limiter is built without one
pub const DEFAULT_LIMITER_NAME: &str = "default";

/// Error returned when a limiter cannot be built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("Invalid capacity: a limiter needs at least one slot")]
    InvalidCapacity,

    #[error("Capacity {capacity} exceeds the maximum of {max} slots")]
    CapacityTooLarge { capacity: usize, max: usize },
}

/// Error returned when a caller gives up waiting for a slot
///
/// The task is never invoked when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    #[error("Cancelled while waiting for an available slot")]
    Cancelled,

    #[error("Timeout waiting for available slot after {timeout:?}")]
    DeadlineExceeded { timeout: Duration },
}

impl CancelError {
    fn reason(&self) -> &'static str {
        match self {
            CancelError::Cancelled => "cancelled",
            CancelError::DeadlineExceeded { .. } => "deadline",
        }
    }
}

/// RAII permit that releases the slot when dropped
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    limiter: Arc<str>,
}

impl Permit {
    fn new(permit: OwnedSemaphorePermit, limiter: Arc<str>) -> Self {
        metrics().record_admitted(&limiter);
        Self {
            _permit: permit,
            limiter,
        }
    }

    /// Name of the limiter this permit belongs to
    pub fn limiter(&self) -> &str {
        &self.limiter
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        metrics().record_released(&self.limiter);
    }
}

/// Counters kept per limiter
#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    cancelled: AtomicU64,
    deadline_exceeded: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of a limiter's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimiterStats {
    pub admitted: u64,
    pub cancelled: u64,
    pub deadline_exceeded: u64,
    pub try_acquire_rejected: u64,
}

/// Bounded concurrency limiter
///
/// Holds a fixed number of slots. [`Limiter::run`] waits for a free slot (or
/// for the caller's cancellation token, whichever fires first), runs the task
/// and hands the slot back once the task is done.
///
/// Cancellation is only observed while waiting for a slot. A task that has
/// been admitted always runs to completion; the limiter never interrupts it.
pub struct Limiter {
    name: Arc<str>,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    default_timeout: Option<Duration>,
    counters: Counters,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

impl Limiter {
    /// Create a limiter with `capacity` slots
    pub fn new(capacity: usize) -> Result<Self, LimitError> {
        Self::named(DEFAULT_LIMITER_NAME, capacity)
    }

    /// Create a limiter whose name shows up in logs and metric labels
    pub fn named(name: impl Into<String>, capacity: usize) -> Result<Self, LimitError> {
        if capacity == 0 {
            return Err(LimitError::InvalidCapacity);
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(LimitError::CapacityTooLarge {
                capacity,
                max: Semaphore::MAX_PERMITS,
            });
        }

        Ok(Self::with_valid_capacity(name, capacity))
    }

    /// Caller guarantees `1 <= capacity <= Semaphore::MAX_PERMITS`
    pub(super) fn with_valid_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: Arc::from(name.into()),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            default_timeout: None,
            counters: Counters::default(),
        }
    }

    /// Build a limiter from its configuration section
    pub fn from_config(config: &LimiterConfig) -> Result<Self, LimitError> {
        let mut limiter = Self::named(config.name.clone(), config.capacity)?;
        limiter.default_timeout = config.acquire_timeout_ms.map(Duration::from_millis);
        Ok(limiter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots, fixed at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently checked out
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Deadline applied by [`Limiter::run_configured`]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Wait for a slot, or until `cancel` fires
    ///
    /// A token that is already cancelled always wins, even when a slot is
    /// free.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, CancelError> {
        self.wait_for_slot(Some(cancel), None).await
    }

    /// Wait for a slot for at most `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Permit, CancelError> {
        self.wait_for_slot(None, Some(timeout)).await
    }

    /// Wait for a slot until `cancel` fires or `timeout` elapses
    pub async fn acquire_until(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<Permit, CancelError> {
        self.wait_for_slot(Some(cancel), Some(timeout)).await
    }

    async fn wait_for_slot(
        &self,
        cancel: Option<&CancellationToken>,
        timeout: Option<Duration>,
    ) -> Result<Permit, CancelError> {
        let started = Instant::now();

        let cancelled = async {
            match cancel {
                Some(cancel) => cancel.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match timeout {
                Some(timeout) => {
                    tokio::time::sleep(timeout).await;
                    timeout
                }
                None => std::future::pending().await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancelled => Err(CancelError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => {
                // The semaphore is never closed.
                permit.map_err(|_| CancelError::Cancelled)
            }
            timeout = deadline => Err(CancelError::DeadlineExceeded { timeout }),
        };
        self.finish_acquire(started, result)
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<Permit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.counters.admitted.fetch_add(1, Ordering::Relaxed);
                Some(Permit::new(permit, self.name.clone()))
            }
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                metrics().record_try_acquire_rejected(&self.name);
                None
            }
        }
    }

    fn finish_acquire(
        &self,
        started: Instant,
        result: Result<OwnedSemaphorePermit, CancelError>,
    ) -> Result<Permit, CancelError> {
        let waited = started.elapsed();
        metrics().observe_wait(&self.name, waited.as_secs_f64());

        match result {
            Ok(permit) => {
                self.counters.admitted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    limiter = %self.name,
                    waited = ?waited,
                    available = self.semaphore.available_permits(),
                    "Acquired limiter slot"
                );
                Ok(Permit::new(permit, self.name.clone()))
            }
            Err(err) => {
                match err {
                    CancelError::Cancelled => &self.counters.cancelled,
                    CancelError::DeadlineExceeded { .. } => &self.counters.deadline_exceeded,
                }
                .fetch_add(1, Ordering::Relaxed);
                metrics().record_cancelled(&self.name, err.reason());
                debug!(
                    limiter = %self.name,
                    waited = ?waited,
                    reason = err.reason(),
                    "Gave up waiting for limiter slot"
                );
                Err(err)
            }
        }
    }

    /// Run `task` once a slot is free
    ///
    /// Returns the task's own result untouched. If `cancel` fires before a
    /// slot is acquired, the task is never called and the caller gets
    /// [`CancelError::Cancelled`] converted into its error type.
    pub async fn run<F, Fut, T, E>(&self, cancel: &CancellationToken, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CancelError>,
    {
        let _permit = self.acquire(cancel).await?;
        task().await
    }

    /// Run `task` once a slot is free, giving up after `timeout`
    pub async fn run_with_timeout<F, Fut, T, E>(&self, timeout: Duration, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CancelError>,
    {
        let _permit = self.acquire_timeout(timeout).await?;
        task().await
    }

    /// Run `task` once a slot is free, giving up when `cancel` fires or
    /// `timeout` elapses, whichever comes first
    pub async fn run_until<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CancelError>,
    {
        let _permit = self.acquire_until(cancel, timeout).await?;
        task().await
    }

    /// Run `task` with `cancel` plus the configured acquire timeout, if any
    pub async fn run_configured<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CancelError>,
    {
        let _permit = self.wait_for_slot(Some(cancel), self.default_timeout).await?;
        task().await
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            deadline_exceeded: self.counters.deadline_exceeded.load(Ordering::Relaxed),
            try_acquire_rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}
