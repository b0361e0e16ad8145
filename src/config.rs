//! Pool configuration options

use std::time::Duration;

/// Sizing and lifetime limits for a resource pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_idle_size(20)
///     .with_max_idle_time(Duration::from_secs(5));
///
/// assert_eq!(config.max_idle_size, 20);
/// assert_eq!(config.max_idle_time, Duration::from_secs(5));
/// assert!(config.validate::<()>().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Maximum number of idle resources kept by the pool.
    /// This is also the number of resources created during warm-up.
    pub max_idle_size: usize,

    /// Maximum time a resource may sit idle before it is evicted
    pub max_idle_time: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_idle_size: 10,
            max_idle_time: Duration::from_secs(30),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of idle resources
    pub fn with_max_idle_size(mut self, size: usize) -> Self {
        self.max_idle_size = size;
        self
    }

    /// Set the maximum idle lifetime
    pub fn with_max_idle_time(mut self, time: Duration) -> Self {
        self.max_idle_time = time;
        self
    }

    /// Check the limits. Both must be non-zero.
    ///
    /// ```
    /// use esox_resourcepool::{PoolConfiguration, PoolError};
    ///
    /// let config = PoolConfiguration::new().with_max_idle_size(0);
    /// assert_eq!(config.validate::<()>(), Err(PoolError::InvalidIdleSize));
    /// ```
    pub fn validate<E>(&self) -> Result<(), crate::PoolError<E>> {
        if self.max_idle_size == 0 {
            return Err(crate::PoolError::InvalidIdleSize);
        }
        if self.max_idle_time.is_zero() {
            return Err(crate::PoolError::InvalidIdleTime);
        }
        Ok(())
    }
}
