use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use slotgate::config::{self, Config};
use slotgate::metrics::metrics;
use slotgate::{CancelError, Limiter};

/// Failure returned by simulated tasks
#[derive(Debug, thiserror::Error)]
enum DriverError {
    #[error("simulated task failure (caller {0})")]
    TaskFailed(usize),
    #[error(transparent)]
    Cancelled(#[from] CancelError),
}

/// Tracks how many simulated tasks are running and the highest value seen
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_or_default_config(std::env::args().nth(1));

    let limiter = Arc::new(Limiter::from_config(&config.limiter)?);
    info!(
        limiter = limiter.name(),
        capacity = limiter.capacity(),
        acquire_timeout_ms = ?config.limiter.acquire_timeout_ms,
        callers = config.driver.callers,
        hold_ms = config.driver.hold_ms,
        fail_every = config.driver.fail_every,
        "Limiter configured"
    );

    // Ctrl-C stops callers that are still waiting; running tasks finish.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling waiting callers");
                cancel.cancel();
            }
        });
    }

    let concurrency = Arc::new(Concurrency::default());
    let hold = Duration::from_millis(config.driver.hold_ms);
    let started = Instant::now();

    let mut callers = JoinSet::new();
    for index in 0..config.driver.callers {
        let limiter = limiter.clone();
        let concurrency = concurrency.clone();
        let cancel = cancel.clone();
        let fails = config.driver.should_fail(index);

        callers.spawn(async move {
            let task = || async {
                concurrency.enter();
                tokio::time::sleep(hold).await;
                concurrency.exit();
                if fails {
                    Err(DriverError::TaskFailed(index))
                } else {
                    Ok(index)
                }
            };
            limiter.run_configured(&cancel, task).await
        });
    }

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut cancelled = 0usize;
    while let Some(joined) = callers.join_next().await {
        match joined {
            Ok(Ok(_)) => succeeded += 1,
            Ok(Err(DriverError::TaskFailed(index))) => {
                warn!(caller = index, "Task failed");
                failed += 1;
            }
            Ok(Err(DriverError::Cancelled(e))) => {
                warn!(error = %e, "Caller gave up waiting");
                cancelled += 1;
            }
            Err(e) => {
                error!(error = %e, "Caller panicked");
                failed += 1;
            }
        }
    }

    info!(
        elapsed = ?started.elapsed(),
        peak_concurrency = concurrency.peak.load(Ordering::SeqCst),
        capacity = limiter.capacity(),
        succeeded,
        failed,
        cancelled,
        available = limiter.available(),
        "Run complete"
    );

    println!("{}", metrics().gather()?);
    Ok(())
}

fn load_or_default_config(explicit: Option<String>) -> Config {
    if let Some(path) = explicit {
        match config::load_config(&path) {
            Ok(config) => {
                info!(path = %path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to load config");
            }
        }
    }

    // Try to load from config file
    let config_paths = ["config/slotgate.toml", "slotgate.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}
