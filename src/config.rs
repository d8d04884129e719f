//! Server configuration.
//!
//! All tunables come from the environment, are resolved once at startup and
//! frozen into a [`Config`] that is passed into every component. There is no
//! process-global mutable state.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Immutable configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    /// FRED API credential. Required.
    pub api_key: String,
    /// Root directory for series files and dataset folders.
    pub data_root: PathBuf,
    /// Maximum number of tool invocations executing in parallel.
    pub worker_limit: usize,
    /// Per-build cap on concurrent gateway fetches.
    pub fetch_concurrency: usize,
    /// Gateway retry budget for rate-limited / unavailable upstream.
    pub retry_attempts: u32,
    /// Soft per-attempt deadline for gateway calls.
    pub soft_deadline: Duration,
    /// Hard whole-call deadline for gateway calls.
    pub hard_deadline: Duration,
}

impl Config {
    /// Default worker pool size.
    pub const DEFAULT_WORKER_LIMIT: usize = 4;
    /// Default per-build fetch concurrency.
    pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;
    /// Default gateway retry budget.
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 4;

    /// Build a configuration, validating the credential.
    ///
    /// An empty or missing API key is a fatal startup error.
    pub fn new(api_key: impl Into<String>, data_root: impl Into<PathBuf>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config(
                "FRED_API_KEY is not set; obtain a key at https://fred.stlouisfed.org/docs/api/api_key.html",
            ));
        }
        Ok(Self {
            api_key,
            data_root: data_root.into(),
            worker_limit: Self::DEFAULT_WORKER_LIMIT,
            fetch_concurrency: Self::DEFAULT_FETCH_CONCURRENCY,
            retry_attempts: Self::DEFAULT_RETRY_ATTEMPTS,
            soft_deadline: Duration::from_secs(30),
            hard_deadline: Duration::from_secs(60),
        })
    }

    /// Override the worker pool size.
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = limit.max(1);
        self
    }

    /// Override the per-build fetch concurrency.
    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_concurrency = limit.max(1);
        self
    }

    /// Override the gateway retry budget.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }
}
