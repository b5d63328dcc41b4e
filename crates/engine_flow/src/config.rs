//! Executor configuration.

use std::num::NonZeroUsize;

use tracing::warn;

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME: &str = "engine-worker";

/// The environment variable used to override the worker count.
pub const WORKERS_ENV: &str = "ENGINE_WORKERS";

/// Configuration for an [`Executor`](crate::Executor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Number of threads running tasks. Always at least one.
    pub workers: usize,
    /// Name given to worker threads.
    pub thread_name: String,
}

impl ExecutorConfig {
    /// One worker per available core.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workers: default_workers(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Like [`ExecutorConfig::new`], with the worker count taken from
    /// `ENGINE_WORKERS` when it holds a positive integer.
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::new();
        match std::env::var(WORKERS_ENV) {
            Ok(raw) => match parse_workers(&raw) {
                Some(workers) => config.with_workers(workers),
                None => {
                    warn!(value = %raw, env = WORKERS_ENV, "ignoring invalid worker count");
                    config
                }
            },
            Err(_) => config,
        }
    }

    /// Override the worker count. Zero is raised to one.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Override the worker thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn parse_workers(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|&workers| workers > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_at_least_one_worker() {
        let config = ExecutorConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ExecutorConfig::new()
            .with_workers(3)
            .with_thread_name("physics");
        assert_eq!(config.workers, 3);
        assert_eq!(config.thread_name, "physics");
    }

    #[test]
    fn test_zero_workers_is_raised_to_one() {
        assert_eq!(ExecutorConfig::new().with_workers(0).workers, 1);
    }

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("4"), Some(4));
        assert_eq!(parse_workers(" 2\n"), Some(2));
        assert_eq!(parse_workers("0"), None);
        assert_eq!(parse_workers("many"), None);
    }
}
