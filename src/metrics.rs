//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{Context, Pool};
/// use std::time::Duration;
///
/// let pool = Pool::new(
///     |_: &Context| Ok::<_, std::io::Error>(Vec::<u8>::new()),
///     |_: &Context, _buf: Vec<u8>| {},
///     3,
///     Duration::from_secs(60),
/// )
/// .unwrap();
///
/// let ctx = Context::background();
/// let buf = pool.acquire(&ctx).unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.created, 3);
/// assert_eq!(metrics.reused, 1);
/// assert_eq!(metrics.idle, 2);
/// pool.release(&ctx, buf);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct PoolMetrics {
    /// Resources produced by the creator, warm-up included
    pub created: usize,

    /// Resources handed to the destroyer
    pub destroyed: usize,

    /// Acquisitions served from the idle store
    pub reused: usize,

    /// Idle resources evicted for exceeding the max idle time
    pub expired: usize,

    /// Releases rejected because the idle store was full or closed
    pub overflowed: usize,

    /// Releases that went back into the idle store
    pub released: usize,

    /// Creator calls that returned an error
    pub creation_failures: usize,

    /// Current idle resources
    pub idle: usize,

    /// Idle store capacity
    pub max_idle_size: usize,

    /// Idle fill ratio (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("created".to_string(), self.created.to_string());
        metrics.insert("destroyed".to_string(), self.destroyed.to_string());
        metrics.insert("reused".to_string(), self.reused.to_string());
        metrics.insert("expired".to_string(), self.expired.to_string());
        metrics.insert("overflowed".to_string(), self.overflowed.to_string());
        metrics.insert("released".to_string(), self.released.to_string());
        metrics.insert("creation_failures".to_string(), self.creation_failures.to_string());
        metrics.insert("idle".to_string(), self.idle.to_string());
        metrics.insert("max_idle_size".to_string(), self.max_idle_size.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::{Context, MetricsExporter, Pool};
    /// use std::collections::HashMap;
    /// use std::time::Duration;
    ///
    /// let pool = Pool::new(
    ///     |_: &Context| Ok::<_, std::io::Error>(0u32),
    ///     |_: &Context, _: u32| {},
    ///     2,
    ///     Duration::from_secs(60),
    /// )
    /// .unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.metrics(), "tcp", Some(&tags));
    /// assert!(output.contains("resourcepool_resources_idle{pool=\"tcp\",service=\"api\"} 2"));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        // Gauge metrics
        output.push_str("# HELP resourcepool_resources_idle Current idle resources\n");
        output.push_str("# TYPE resourcepool_resources_idle gauge\n");
        output.push_str(&format!("resourcepool_resources_idle{{{}}} {}\n", labels, metrics.idle));

        output.push_str("# HELP resourcepool_idle_capacity Idle store capacity\n");
        output.push_str("# TYPE resourcepool_idle_capacity gauge\n");
        output.push_str(&format!("resourcepool_idle_capacity{{{}}} {}\n", labels, metrics.max_idle_size));

        output.push_str("# HELP resourcepool_utilization Idle store fill ratio\n");
        output.push_str("# TYPE resourcepool_utilization gauge\n");
        output.push_str(&format!("resourcepool_utilization{{{}}} {:.2}\n", labels, metrics.utilization));

        // Counter metrics
        let counters = [
            ("resourcepool_resources_created_total", "Resources created", metrics.created),
            ("resourcepool_resources_destroyed_total", "Resources destroyed", metrics.destroyed),
            ("resourcepool_resources_reused_total", "Acquisitions served from idle", metrics.reused),
            ("resourcepool_resources_expired_total", "Idle resources evicted by age", metrics.expired),
            ("resourcepool_releases_overflowed_total", "Releases destroyed on overflow", metrics.overflowed),
            ("resourcepool_releases_total", "Releases returned to idle", metrics.released),
            ("resourcepool_creation_failures_total", "Creator failures", metrics.creation_failures),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub reused: AtomicUsize,
    pub expired: AtomicUsize,
    pub overflowed: AtomicUsize,
    pub released: AtomicUsize,
    pub creation_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, idle: usize, max_idle_size: usize) -> PoolMetrics {
        let utilization = if max_idle_size > 0 {
            idle as f64 / max_idle_size as f64
        } else {
            0.0
        };

        PoolMetrics {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            idle,
            max_idle_size,
            utilization,
        }
    }
}
