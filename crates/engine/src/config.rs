use std::str::FromStr;
use std::time::Duration;

use taskforge_core::retry::{RetryPolicy, DEFAULT_MAX_BACKOFF, DEFAULT_RETRY_BASE};

use crate::janitor::JanitorConfig;

/// Default number of concurrent worker loops.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default pool-wide handler timeout.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default upper bound on how long an idle worker waits before re-polling.
pub const DEFAULT_DEQUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default `max_retries` for [`crate::Orchestrator::submit_default`].
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of attempts for a single store write.
pub const DEFAULT_STORE_WRITE_ATTEMPTS: u32 = 3;

/// Default base delay between store write attempts.
pub const DEFAULT_STORE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Engine configuration.
///
/// All fields have defaults suitable for production; override via
/// environment variables with [`EngineConfig::from_env`] or build the
/// struct directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent worker loops (at least one is always started).
    pub worker_count: usize,
    /// Pool-wide handler timeout; handlers may override it per type.
    pub task_timeout: Duration,
    /// Bounded poll interval for idle workers.
    pub dequeue_poll_interval: Duration,
    /// Backoff between attempts of a failing task.
    pub retry: RetryPolicy,
    /// `max_retries` applied by `submit_default`.
    pub default_max_retries: u32,
    /// Attempts for each store write made by the engine.
    pub store_write_attempts: u32,
    /// Base delay between store write attempts (grows linearly).
    pub store_retry_delay: Duration,
    /// Retention sweep cadence and window.
    pub janitor: JanitorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            dequeue_poll_interval: DEFAULT_DEQUEUE_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            default_max_retries: DEFAULT_MAX_RETRIES,
            store_write_attempts: DEFAULT_STORE_WRITE_ATTEMPTS,
            store_retry_delay: DEFAULT_STORE_RETRY_DELAY,
            janitor: JanitorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default  |
    /// |--------------------------|----------|
    /// | `WORKER_COUNT`           | `5`      |
    /// | `TASK_TIMEOUT_SECS`      | `300`    |
    /// | `DEQUEUE_POLL_MS`        | `1000`   |
    /// | `RETRY_BASE_SECS`        | `2`      |
    /// | `RETRY_MAX_BACKOFF_SECS` | `300`    |
    /// | `DEFAULT_MAX_RETRIES`    | `3`      |
    /// | `STORE_WRITE_ATTEMPTS`   | `3`      |
    /// | `STORE_RETRY_DELAY_MS`   | `100`    |
    /// | `JANITOR_INTERVAL_SECS`  | `86400`  |
    /// | `TASK_RETENTION_DAYS`    | `7`      |
    ///
    /// Unparsable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let janitor_defaults = JanitorConfig::default();

        let worker_count: usize = env_or("WORKER_COUNT", defaults.worker_count);
        let task_timeout_secs: u64 = env_or("TASK_TIMEOUT_SECS", defaults.task_timeout.as_secs());
        let poll_ms: u64 = env_or(
            "DEQUEUE_POLL_MS",
            defaults.dequeue_poll_interval.as_millis() as u64,
        );
        let retry_base_secs: u64 = env_or("RETRY_BASE_SECS", DEFAULT_RETRY_BASE.as_secs());
        let retry_max_secs: u64 = env_or("RETRY_MAX_BACKOFF_SECS", DEFAULT_MAX_BACKOFF.as_secs());
        let store_retry_ms: u64 = env_or(
            "STORE_RETRY_DELAY_MS",
            defaults.store_retry_delay.as_millis() as u64,
        );
        let janitor_interval_secs: u64 =
            env_or("JANITOR_INTERVAL_SECS", janitor_defaults.interval.as_secs());
        let retention_days: u64 = env_or(
            "TASK_RETENTION_DAYS",
            janitor_defaults.retention.as_secs() / SECS_PER_DAY,
        );

        Self {
            worker_count: worker_count.max(1),
            task_timeout: Duration::from_secs(task_timeout_secs.max(1)),
            dequeue_poll_interval: Duration::from_millis(poll_ms.max(1)),
            retry: RetryPolicy {
                base: Duration::from_secs(retry_base_secs),
                max_backoff: Duration::from_secs(retry_max_secs),
            },
            default_max_retries: env_or("DEFAULT_MAX_RETRIES", defaults.default_max_retries),
            store_write_attempts: env_or("STORE_WRITE_ATTEMPTS", defaults.store_write_attempts)
                .max(1),
            store_retry_delay: Duration::from_millis(store_retry_ms),
            janitor: JanitorConfig {
                interval: Duration::from_secs(janitor_interval_secs.max(1)),
                retention: Duration::from_secs(retention_days.saturating_mul(SECS_PER_DAY)),
            },
        }
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(key: &str, raw: Option<&str>, default: T) -> T {
    match raw {
        None => default,
        Some(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(key, value, "Invalid configuration value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.retry.base, Duration::from_secs(2));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(300));
        assert_eq!(config.janitor.interval, Duration::from_secs(86_400));
        assert_eq!(config.janitor.retention, Duration::from_secs(7 * SECS_PER_DAY));
    }

    #[test]
    fn parse_or_uses_value_when_valid() {
        assert_eq!(parse_or("WORKER_COUNT", Some(" 8 "), 5usize), 8);
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        assert_eq!(parse_or("WORKER_COUNT", Some("many"), 5usize), 5);
    }

    #[test]
    fn parse_or_falls_back_when_unset() {
        assert_eq!(parse_or("TASK_TIMEOUT_SECS", None, 300u64), 300);
    }
}
