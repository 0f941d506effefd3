//! Bounded concurrency limiting with cooperative cancellation.
//!
//! A [`Limiter`] caps how many tasks run at once. Callers wait for a free
//! slot until their [`CancellationToken`](tokio_util::sync::CancellationToken)
//! fires (or a deadline passes), and get their task's own result back
//! untouched once it has run.
//!
//! ```no_run
//! use slotgate::{CancelError, Limiter};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), CancelError> {
//! let limiter = Limiter::new(10).expect("non-zero capacity");
//! let cancel = CancellationToken::new();
//!
//! let answer = limiter.run(&cancel, || async { Ok::<_, CancelError>(42) }).await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod limiter;
pub mod metrics;

pub use limiter::{
    CancelError, KeyedLimiter, LimitError, Limiter, LimiterStats, Permit, DEFAULT_LIMITER_NAME,
};
