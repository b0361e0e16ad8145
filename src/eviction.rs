//! Age-based eviction for idle resources

use std::time::{Duration, Instant};

/// An idle resource together with the moment it entered the pool.
///
/// Warm-up and release both stamp a fresh `created_at`; the resource is
/// considered stale once it has sat idle for `max_idle_time` or longer.
#[derive(Debug)]
pub(crate) struct IdleResource<T> {
    value: T,
    created_at: Instant,
}

impl<T> IdleResource<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, max_idle_time: Duration) -> bool {
        self.is_expired_at(Instant::now(), max_idle_time)
    }

    pub fn is_expired_at(&self, now: Instant, max_idle_time: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= max_idle_time
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
