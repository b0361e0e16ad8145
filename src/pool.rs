//! Core resource pool implementation

use crate::config::PoolConfiguration;
use crate::context::Context;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::IdleResource;
use crate::metrics::{MetricsTracker, PoolMetrics};

use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

type Creator<T, E> = Box<dyn Fn(&Context) -> Result<T, E> + Send + Sync>;
type Destroyer<T> = Box<dyn Fn(&Context, T) + Send + Sync>;

/// Thread-safe pool of idle, reusable resources.
///
/// The pool keeps at most `max_idle_size` idle resources. [`acquire`](Pool::acquire)
/// hands out an idle resource if a fresh one is available and otherwise calls the
/// creator; the number of checked-out resources is not capped.
/// [`release`](Pool::release) puts a resource back, or destroys it when the idle
/// store is full. Neither call ever waits for another caller.
///
/// `Pool` is a cheap handle: clones share the same idle store. When the last
/// handle is dropped the remaining idle resources are destroyed.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{Context, Pool};
/// use std::time::Duration;
///
/// let pool = Pool::new(
///     |_: &Context| Ok::<_, std::io::Error>(String::from("conn")),
///     |_: &Context, conn: String| drop(conn),
///     4,
///     Duration::from_secs(30),
/// )
/// .unwrap();
///
/// let ctx = Context::background();
/// assert_eq!(pool.num_idle(), 4);
///
/// let conn = pool.acquire(&ctx).unwrap();
/// assert_eq!(pool.num_idle(), 3);
///
/// pool.release(&ctx, conn);
/// assert_eq!(pool.num_idle(), 4);
/// ```
pub struct Pool<T, E> {
    inner: Arc<PoolInner<T, E>>,
}

struct PoolInner<T, E> {
    idle: ArrayQueue<IdleResource<T>>,
    /// Set once by teardown. Release holds it for reading while pushing.
    closed: RwLock<bool>,
    creator: Creator<T, E>,
    destroyer: Destroyer<T>,
    config: PoolConfiguration,
    metrics: MetricsTracker,
}

impl<T, E> Clone for Pool<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Pool<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("num_idle", &self.inner.idle.len())
            .field("max_idle_size", &self.inner.config.max_idle_size)
            .field("max_idle_time", &self.inner.config.max_idle_time)
            .field("closed", &*self.inner.closed.read())
            .finish()
    }
}

impl<T: Send + 'static, E: 'static> Pool<T, E> {
    /// Create a pool and warm it up to `max_idle_size` resources.
    ///
    /// Fails with a configuration error before calling the creator if
    /// `max_idle_size` or `max_idle_time` is zero. If the creator fails during
    /// warm-up, every resource created so far is destroyed and the creator's
    /// error is returned as [`PoolError::Create`].
    pub fn new<C, D>(
        creator: C,
        destroyer: D,
        max_idle_size: usize,
        max_idle_time: Duration,
    ) -> PoolResult<Self, E>
    where
        C: Fn(&Context) -> Result<T, E> + Send + Sync + 'static,
        D: Fn(&Context, T) + Send + Sync + 'static,
    {
        Self::builder()
            .creator(creator)
            .destroyer(destroyer)
            .max_idle_size(max_idle_size)
            .max_idle_time(max_idle_time)
            .build()
    }

    pub fn builder() -> PoolBuilder<T, E> {
        PoolBuilder::new()
    }

    /// Get a ready-to-use resource.
    ///
    /// Idle resources older than `max_idle_time` are destroyed as they are
    /// found. When no fresh idle resource is left the creator is called and its
    /// result, error included, is returned as is. `ctx` is only forwarded to
    /// the callbacks.
    pub fn acquire(&self, ctx: &Context) -> Result<T, E> {
        let max_idle_time = self.inner.config.max_idle_time;

        while let Some(idle) = self.inner.idle.pop() {
            if idle.is_expired(max_idle_time) {
                MetricsTracker::incr(&self.inner.metrics.expired);
                trace!(?max_idle_time, "evicting expired idle resource");
                self.inner.destroy(ctx, idle.into_inner());
                continue;
            }

            MetricsTracker::incr(&self.inner.metrics.reused);
            trace!("reusing idle resource");
            return Ok(idle.into_inner());
        }

        trace!("no idle resource available, creating one");
        self.inner.create(ctx)
    }

    /// Give a resource back to the pool.
    ///
    /// The resource is stamped as freshly idle. If the idle store is full, or
    /// the pool has been closed, it is destroyed instead.
    pub fn release(&self, ctx: &Context, value: T) {
        let rejected = {
            let closed = self.inner.closed.read();
            if *closed {
                Some(value)
            } else {
                self.inner
                    .idle
                    .push(IdleResource::new(value))
                    .err()
                    .map(IdleResource::into_inner)
            }
        };

        match rejected {
            None => {
                MetricsTracker::incr(&self.inner.metrics.released);
            }
            Some(value) => {
                MetricsTracker::incr(&self.inner.metrics.overflowed);
                trace!("idle store full, destroying released resource");
                self.inner.destroy(ctx, value);
            }
        }
    }

    /// Number of idle resources right now
    pub fn num_idle(&self) -> usize {
        self.inner.idle.len()
    }

    /// Destroy all idle resources and stop accepting releases.
    ///
    /// Only the first call does anything. Afterwards released resources are
    /// destroyed immediately and [`acquire`](Pool::acquire) always goes to the
    /// creator.
    pub fn close(&self, ctx: &Context) {
        let drained = self.inner.teardown(ctx);
        if let Some(drained) = drained {
            debug!(drained, "resource pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.read()
    }

    pub fn max_idle_size(&self) -> usize {
        self.inner.config.max_idle_size
    }

    pub fn max_idle_time(&self) -> Duration {
        self.inner.config.max_idle_time
    }

    pub fn config(&self) -> PoolConfiguration {
        self.inner.config
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.inner
            .metrics
            .get_metrics(self.inner.idle.len(), self.inner.config.max_idle_size)
    }
}

impl<T, E> PoolInner<T, E> {
    fn create(&self, ctx: &Context) -> Result<T, E> {
        match (self.creator)(ctx) {
            Ok(value) => {
                MetricsTracker::incr(&self.metrics.created);
                Ok(value)
            }
            Err(e) => {
                MetricsTracker::incr(&self.metrics.creation_failures);
                Err(e)
            }
        }
    }

    fn destroy(&self, ctx: &Context, value: T) {
        MetricsTracker::incr(&self.metrics.destroyed);
        (self.destroyer)(ctx, value);
    }

    /// Close the idle store and destroy everything left in it.
    /// Returns `None` if the store was already closed.
    fn teardown(&self, ctx: &Context) -> Option<usize> {
        {
            let mut closed = self.closed.write();
            if *closed {
                return None;
            }
            *closed = true;
        }

        let mut drained = 0;
        while let Some(idle) = self.idle.pop() {
            self.destroy(ctx, idle.into_inner());
            drained += 1;
        }
        Some(drained)
    }
}

impl<T, E> Drop for PoolInner<T, E> {
    fn drop(&mut self) {
        if let Some(drained) = self.teardown(&Context::background()) {
            trace!(drained, "resource pool dropped");
        }
    }
}

/// Builder for [`Pool`].
///
/// The creator and destroyer are required; building without them fails with
/// [`PoolError::CreatorMissing`] or [`PoolError::DestroyerMissing`]. Limits
/// default to [`PoolConfiguration::default`].
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{Context, Pool, PoolConfiguration, PoolError};
/// use std::time::Duration;
///
/// let missing = Pool::<u32, std::io::Error>::builder()
///     .destroyer(|_: &Context, _| {})
///     .build();
/// assert!(matches!(missing, Err(PoolError::CreatorMissing)));
///
/// let pool = Pool::builder()
///     .creator(|_: &Context| Ok::<_, std::io::Error>(1u32))
///     .destroyer(|_: &Context, _| {})
///     .config(PoolConfiguration::new().with_max_idle_size(2))
///     .max_idle_time(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// assert_eq!(pool.num_idle(), 2);
/// ```
pub struct PoolBuilder<T, E> {
    creator: Option<Creator<T, E>>,
    destroyer: Option<Destroyer<T>>,
    config: PoolConfiguration,
}

impl<T: Send + 'static, E: 'static> PoolBuilder<T, E> {
    pub fn new() -> Self {
        Self {
            creator: None,
            destroyer: None,
            config: PoolConfiguration::default(),
        }
    }

    /// Set the callback that creates a new resource
    pub fn creator<C>(mut self, creator: C) -> Self
    where
        C: Fn(&Context) -> Result<T, E> + Send + Sync + 'static,
    {
        self.creator = Some(Box::new(creator));
        self
    }

    /// Set the callback that releases a resource's underlying handle
    pub fn destroyer<D>(mut self, destroyer: D) -> Self
    where
        D: Fn(&Context, T) + Send + Sync + 'static,
    {
        self.destroyer = Some(Box::new(destroyer));
        self
    }

    pub fn max_idle_size(mut self, size: usize) -> Self {
        self.config.max_idle_size = size;
        self
    }

    pub fn max_idle_time(mut self, time: Duration) -> Self {
        self.config.max_idle_time = time;
        self
    }

    /// Replace both limits at once
    pub fn config(mut self, config: PoolConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Validate, then warm up with a background context
    pub fn build(self) -> PoolResult<Pool<T, E>, E> {
        self.build_with(&Context::background())
    }

    /// Validate, then warm up, passing `ctx` to every creator call
    pub fn build_with(self, ctx: &Context) -> PoolResult<Pool<T, E>, E> {
        let creator = self.creator.ok_or(PoolError::CreatorMissing)?;
        let destroyer = self.destroyer.ok_or(PoolError::DestroyerMissing)?;
        self.config.validate::<E>()?;

        let inner = PoolInner {
            idle: ArrayQueue::new(self.config.max_idle_size),
            closed: RwLock::new(false),
            creator,
            destroyer,
            config: self.config,
            metrics: MetricsTracker::new(),
        };

        for created in 0..self.config.max_idle_size {
            match inner.create(ctx) {
                Ok(value) => {
                    // capacity equals the warm-up count
                    let _ = inner.idle.push(IdleResource::new(value));
                }
                Err(e) => {
                    warn!(
                        created,
                        max_idle_size = self.config.max_idle_size,
                        "resource creation failed during warm-up, tearing down"
                    );
                    inner.teardown(ctx);
                    return Err(PoolError::Create(e));
                }
            }
        }

        debug!(
            max_idle_size = self.config.max_idle_size,
            max_idle_time = ?self.config.max_idle_time,
            "resource pool created"
        );

        Ok(Pool {
            inner: Arc::new(inner),
        })
    }
}

impl<T: Send + 'static, E: 'static> Default for PoolBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    struct Counters {
        created: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    fn counting_pool(size: usize, max_idle_time: Duration) -> (Pool<usize, String>, Counters) {
        let created = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&created);
        let d = Arc::clone(&destroyed);

        let pool = Pool::new(
            move |_: &Context| Ok(c.fetch_add(1, Ordering::SeqCst)),
            move |_: &Context, _| {
                d.fetch_add(1, Ordering::SeqCst);
            },
            size,
            max_idle_time,
        )
        .unwrap();

        (pool, Counters { created, destroyed })
    }

    fn config_error(
        builder: PoolBuilder<usize, String>,
        destroyed: &AtomicUsize,
    ) -> PoolError<String> {
        let err = builder.build().unwrap_err();
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        err
    }

    #[test]
    fn test_new_warms_up_to_capacity() {
        let (pool, counters) = counting_pool(10, Duration::from_secs(60));
        assert_eq!(pool.num_idle(), 10);
        assert_eq!(counters.created.load(Ordering::SeqCst), 10);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_configuration() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let destroyer = {
            let d = Arc::clone(&destroyed);
            move |_: &Context, _: usize| {
                d.fetch_add(1, Ordering::SeqCst);
            }
        };
        let created = Arc::new(AtomicUsize::new(0));
        let creator = {
            let c = Arc::clone(&created);
            move |_: &Context| Ok::<usize, String>(c.fetch_add(1, Ordering::SeqCst))
        };

        let err = config_error(Pool::builder().destroyer(destroyer.clone()), &destroyed);
        assert_eq!(err, PoolError::CreatorMissing);

        let err = config_error(Pool::builder().creator(creator.clone()), &destroyed);
        assert_eq!(err, PoolError::DestroyerMissing);

        let err = config_error(
            Pool::builder()
                .creator(creator.clone())
                .destroyer(destroyer.clone())
                .max_idle_size(0),
            &destroyed,
        );
        assert_eq!(err, PoolError::InvalidIdleSize);

        let err = config_error(
            Pool::builder()
                .creator(creator)
                .destroyer(destroyer)
                .max_idle_size(10)
                .max_idle_time(Duration::ZERO),
            &destroyed,
        );
        assert_eq!(err, PoolError::InvalidIdleTime);
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_warm_up_failure_destroys_created() {
        let calls = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let d = Arc::clone(&destroyed);

        // fails on the 4th call
        let result = Pool::new(
            move |_: &Context| {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 4 { Err(format!("dial {n} failed")) } else { Ok(n) }
            },
            move |_: &Context, _| {
                d.fetch_add(1, Ordering::SeqCst);
            },
            10,
            Duration::from_secs(1),
        );

        assert_eq!(result.unwrap_err(), PoolError::Create("dial 4 failed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(destroyed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_acquire_reuses_idle() {
        let (pool, counters) = counting_pool(10, Duration::from_secs(60));

        let value = pool.acquire(&Context::background()).unwrap();
        assert!(value < 10);
        assert_eq!(pool.num_idle(), 9);
        assert_eq!(counters.created.load(Ordering::SeqCst), 10);
        assert_eq!(pool.metrics().reused, 1);
    }

    #[test]
    fn test_acquire_evicts_expired_then_creates() {
        let (pool, counters) = counting_pool(5, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(40));

        let value = pool.acquire(&Context::background()).unwrap();
        assert_eq!(value, 5);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 5);
        assert_eq!(counters.created.load(Ordering::SeqCst), 6);
        assert_eq!(pool.metrics().expired, 5);
    }

    #[test]
    fn test_acquire_skips_expired_then_reuses_fresh() {
        let (pool, counters) = counting_pool(3, Duration::from_millis(50));
        let ctx = Context::background();

        let value = pool.acquire(&ctx).unwrap();
        thread::sleep(Duration::from_millis(80));
        // the two warm-up leftovers are stale, the released value is fresh
        pool.release(&ctx, value);

        assert_eq!(pool.acquire(&ctx).unwrap(), value);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(counters.created.load(Ordering::SeqCst), 3);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(pool.metrics().expired, 2);
    }

    #[test]
    fn test_acquire_on_empty_store_creates_without_limit() {
        let (pool, counters) = counting_pool(2, Duration::from_secs(60));
        let ctx = Context::background();

        let held: Vec<_> = (0..5).map(|_| pool.acquire(&ctx).unwrap()).collect();
        assert_eq!(held.len(), 5);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(counters.created.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_acquire_returns_creator_error() {
        let fail = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fail);
        let pool = Pool::new(
            move |_: &Context| {
                if f.load(Ordering::SeqCst) { Err("refused".to_string()) } else { Ok(()) }
            },
            |_: &Context, _| {},
            1,
            Duration::from_secs(60),
        )
        .unwrap();
        let ctx = Context::background();

        pool.acquire(&ctx).unwrap();
        fail.store(true, Ordering::SeqCst);
        assert_eq!(pool.acquire(&ctx), Err("refused".to_string()));
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(pool.metrics().creation_failures, 1);

        pool.release(&ctx, ());
        assert_eq!(pool.num_idle(), 1);
    }

    #[test]
    fn test_release_below_and_at_capacity() {
        let (pool, counters) = counting_pool(3, Duration::from_secs(60));
        let ctx = Context::background();

        let value = pool.acquire(&ctx).unwrap();
        pool.release(&ctx, value);
        assert_eq!(pool.num_idle(), 3);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 0);

        pool.release(&ctx, 99);
        assert_eq!(pool.num_idle(), 3);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.metrics().overflowed, 1);
    }

    #[test]
    fn test_release_restamps_idle_time() {
        let (pool, counters) = counting_pool(1, Duration::from_millis(500));
        let ctx = Context::background();

        let value = pool.acquire(&ctx).unwrap();
        thread::sleep(Duration::from_millis(300));
        pool.release(&ctx, value);
        thread::sleep(Duration::from_millis(300));

        assert_eq!(pool.acquire(&ctx).unwrap(), value);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_is_one_shot() {
        let (pool, counters) = counting_pool(4, Duration::from_secs(60));
        let ctx = Context::background();

        pool.close(&ctx);
        pool.close(&ctx);
        assert!(pool.is_closed());
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 4);

        pool.release(&ctx, 42);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 5);

        assert_eq!(pool.acquire(&ctx).unwrap(), 4);
    }

    #[test]
    fn test_drop_destroys_idle() {
        let (pool, counters) = counting_pool(3, Duration::from_secs(60));
        let clone = pool.clone();
        drop(pool);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 0);

        drop(clone);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_context_forwarded_to_callbacks() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let pool = Pool::new(
            |ctx: &Context| Ok::<_, String>(ctx.is_cancelled()),
            move |ctx: &Context, _| {
                if ctx.is_cancelled() {
                    s.fetch_add(1, Ordering::SeqCst);
                }
            },
            1,
            Duration::from_secs(60),
        )
        .unwrap();

        let ctx = Context::background();
        ctx.cancel();
        pool.release(&ctx, true);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        pool.acquire(&ctx).unwrap();
        assert!(pool.acquire(&ctx).unwrap());
    }

    #[test]
    fn test_num_idle_bounded_under_concurrency() {
        let (pool, _) = counting_pool(5, Duration::from_secs(60));
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    assert!(pool.num_idle() <= 5);
                }
            });

            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let ctx = Context::background();
                        for _ in 0..200 {
                            let value = pool.acquire(&ctx).unwrap();
                            pool.release(&ctx, value);
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
            done.store(true, Ordering::Relaxed);
        });

        assert!(pool.num_idle() <= 5);
    }

    #[test]
    fn test_close_races_with_release() {
        let (pool, counters) = counting_pool(8, Duration::from_secs(60));
        let barrier = Barrier::new(5);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let ctx = Context::background();
                    barrier.wait();
                    for i in 0..50 {
                        pool.release(&ctx, 1000 + i);
                    }
                });
            }
            barrier.wait();
            pool.close(&Context::background());
        });

        assert_eq!(pool.num_idle(), 0);
        // 8 warm-up resources and 200 releases all end up destroyed
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 208);
    }
}
