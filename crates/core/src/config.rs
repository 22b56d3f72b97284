//! Engine configuration.
//!
//! ## Constants
//!
//! - `DEFAULT_INDEX_DEGREE`: minimum degree `t` of every column index tree.
//!   A node holds between `t - 1` and `2t - 1` keys, so `t` must be at least 2.
//! - `DEFAULT_LOCK_RETRY_INTERVAL`: how long a blocked write-lock request
//!   sleeps before re-checking the slot. Any lock release wakes it early.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default minimum degree of column index trees.
pub const DEFAULT_INDEX_DEGREE: usize = 3;

/// Smallest degree a B-tree can have.
pub const MIN_INDEX_DEGREE: usize = 2;

/// Default backoff between write-lock attempts.
pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables for a storage engine instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    index_degree: usize,
    lock_retry_interval: Duration,
    lock_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            index_degree: DEFAULT_INDEX_DEGREE,
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
            lock_timeout: None,
        }
    }

    /// Sets the minimum degree of column index trees.
    pub fn index_degree(mut self, degree: usize) -> Self {
        self.index_degree = degree;
        self
    }

    /// Sets the write-lock backoff interval.
    pub fn lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Bounds every write-lock wait performed by the transaction manager.
    /// `None` waits forever.
    pub fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Returns the index degree.
    #[inline]
    pub fn get_index_degree(&self) -> usize {
        self.index_degree
    }

    /// Returns the write-lock backoff interval.
    #[inline]
    pub fn get_lock_retry_interval(&self) -> Duration {
        self.lock_retry_interval
    }

    /// Returns the write-lock timeout, if any.
    #[inline]
    pub fn get_lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<()> {
        if self.index_degree < MIN_INDEX_DEGREE {
            return Err(Error::invalid_config(format!(
                "index degree must be at least {}, got {}",
                MIN_INDEX_DEGREE, self.index_degree
            )));
        }
        if self.lock_retry_interval.is_zero() {
            return Err(Error::invalid_config("lock retry interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
