//! Bounded concurrency limiting
//!
//! - [`Limiter`]: a fixed number of slots shared by any number of callers
//! - [`KeyedLimiter`]: an independent [`Limiter`] per key

mod gate;
mod keyed;

pub use gate::{CancelError, LimitError, Limiter, LimiterStats, Permit, DEFAULT_LIMITER_NAME};
pub use keyed::KeyedLimiter;
