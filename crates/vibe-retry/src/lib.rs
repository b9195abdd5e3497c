//! Exponential-backoff retry for transient integration-client failures.
//!
//! Spec §5 ("Rate-limit handling"): HTTP 429, 5xx, and flagged-retryable
//! network errors are retried with exponential backoff up to a bounded
//! number of attempts; everything else surfaces immediately. This crate
//! provides the backoff math and a small executor; classification of
//! *which* errors are retryable lives on [`vibe_types::VibeError`].
//!
//! # Example
//!
//! ```
//! use vibe_retry::{RetryPolicy, RetryExecutor};
//!
//! let executor = RetryExecutor::from_policy(RetryPolicy::Default);
//! let result = executor.run(|attempt| {
//!     if attempt < 2 { Err("transient") } else { Ok("ok") }
//! });
//! assert_eq!(result, Ok("ok"));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vibe_types::VibeError;

/// Backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    Immediate,
    #[default]
    Exponential,
    Linear,
    Constant,
}

/// Predefined retry policies. `Default` matches spec §5's general rate-limit
/// handling; `Aggressive`/`Conservative` exist for clients that want a
/// different attempts/latency trade-off (e.g. CI polling vs. a one-shot
/// mutation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    #[default]
    Default,
    Aggressive,
    Conservative,
}

impl RetryPolicy {
    pub fn to_config(self) -> RetryStrategyConfig {
        match self {
            RetryPolicy::Default => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 5,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                jitter: 0.3,
            },
            RetryPolicy::Aggressive => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 8,
                base_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(15),
                jitter: 0.2,
            },
            RetryPolicy::Conservative => RetryStrategyConfig {
                strategy: RetryStrategyType::Linear,
                max_attempts: 3,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(20),
                jitter: 0.1,
            },
        }
    }
}

/// Concrete backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    pub strategy: RetryStrategyType,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter factor in `[0.0, 1.0]`; `0.0` disables jitter.
    pub jitter: f64,
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        RetryPolicy::Default.to_config()
    }
}

/// Compute the delay before the given attempt (1-indexed).
pub fn calculate_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => config.base_delay.saturating_mul(attempt),
        RetryStrategyType::Constant => config.base_delay,
    };

    let capped = delay.min(config.max_delay);

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;

    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.r#gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round() as u64;
    Duration::from_millis(millis)
}

/// Runs a fallible operation under a retry policy, sleeping between
/// attempts. Retries are invisible to the user (spec §7) — callers only
/// see the final `Ok`/`Err`.
pub struct RetryExecutor {
    config: RetryStrategyConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryStrategyConfig) -> Self {
        Self { config }
    }

    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self::new(policy.to_config())
    }

    /// Run `operation`, retrying while it returns `Err` and the error is
    /// classified retryable by `should_retry`. `operation` receives the
    /// current attempt number, starting at 1.
    pub fn run<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if attempt >= self.config.max_attempts {
                        return Err(e);
                    }
                    std::thread::sleep(calculate_delay(&self.config, attempt));
                    attempt += 1;
                }
            }
        }
    }

    /// Run a `VibeError`-returning operation, stopping retries as soon as
    /// the error is classified non-retryable regardless of attempts left.
    pub fn run_vibe<T, F>(&self, mut operation: F) -> Result<T, VibeError>
    where
        F: FnMut(u32) -> Result<T, VibeError>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.config.max_attempts {
                        return Err(e);
                    }
                    std::thread::sleep(calculate_delay(&self.config, attempt));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delay_doubles_and_caps() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
            max_attempts: 10,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_secs(1));
        assert_eq!(calculate_delay(&config, 2), Duration::from_secs(2));
        assert_eq!(calculate_delay(&config, 4), Duration::from_secs(8));
        assert_eq!(calculate_delay(&config, 10), Duration::from_secs(10));
    }

    #[test]
    fn constant_delay_never_changes() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Constant,
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
            max_attempts: 5,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_secs(3));
        assert_eq!(calculate_delay(&config, 5), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Constant,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
            max_attempts: 10,
        };
        for _ in 0..50 {
            let delay = calculate_delay(&config, 1);
            assert!(delay >= Duration::from_millis(5000));
            assert!(delay <= Duration::from_millis(15000));
        }
    }

    #[test]
    fn executor_retries_then_succeeds() {
        let executor = RetryExecutor::new(RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
            max_attempts: 5,
        });

        let mut attempts = 0;
        let result = executor.run(|attempt| {
            attempts = attempt;
            if attempt < 3 { Err("nope") } else { Ok("yes") }
        });
        assert_eq!(result, Ok("yes"));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn executor_stops_on_non_retryable_vibe_error() {
        let executor = RetryExecutor::new(RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
            max_attempts: 5,
        });

        let mut calls = 0;
        let result = executor.run_vibe(|_attempt| {
            calls += 1;
            Err::<(), _>(VibeError::validation("id", "x", "bad"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1, "non-retryable errors must not be retried");
    }

    #[test]
    fn executor_exhausts_max_attempts_on_transient_error() {
        let executor = RetryExecutor::new(RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
            max_attempts: 3,
        });

        let mut calls = 0;
        let result = executor.run_vibe(|_attempt| {
            calls += 1;
            Err::<(), _>(VibeError::transient("GetPR", "network blip"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
