use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub limiter: LimiterConfig,
    /// Settings for the `slotgate` load driver
    #[serde(default)]
    pub driver: DriverConfig,
}

// ============================================================================
// Limiter Configuration
// ============================================================================

/// Configuration for a single limiter
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    /// Name used in logs and metric labels
    #[serde(default = "default_limiter_name")]
    pub name: String,
    /// Maximum number of tasks running at once
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Timeout in milliseconds for waiting on a slot (unset = wait forever)
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

fn default_limiter_name() -> String {
    crate::limiter::DEFAULT_LIMITER_NAME.to_string()
}

fn default_capacity() -> usize {
    10
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            name: default_limiter_name(),
            capacity: default_capacity(),
            acquire_timeout_ms: None,
        }
    }
}

// ============================================================================
// Driver Configuration
// ============================================================================

/// Simulated workload pushed through the limiter by the binary
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Number of concurrent callers
    #[serde(default = "default_callers")]
    pub callers: usize,
    /// How long each task holds its slot (milliseconds)
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
    /// Every n-th caller's task fails (0 = never)
    #[serde(default)]
    pub fail_every: usize,
}

fn default_callers() -> usize {
    25
}

fn default_hold_ms() -> u64 {
    25
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            callers: default_callers(),
            hold_ms: default_hold_ms(),
            fail_every: 0,
        }
    }
}

impl DriverConfig {
    /// Whether the task of caller `index` (0-based) should fail
    pub fn should_fail(&self, index: usize) -> bool {
        self.fail_every > 0 && (index + 1) % self.fail_every == 0
    }
}
