//! # EsoxSolutions.ResourcePool
//!
//! Thread-safe pool for expensive-to-create, explicitly destroyed resources
//! such as network connections.
//!
//! ## Features
//!
//! - Lock-free bounded idle store
//! - Eager warm-up to capacity, with cleanup if warm-up fails
//! - Age-based eviction of idle resources
//! - Overflowing releases are destroyed, never dropped silently
//! - Opaque cancellation [`Context`] forwarded to creator and destroyer
//! - Metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::{Context, Pool};
//! use std::time::Duration;
//!
//! let pool = Pool::new(
//!     |_: &Context| Ok::<_, std::io::Error>(vec![0u8; 1024]),
//!     |_: &Context, _buf: Vec<u8>| {},
//!     8,
//!     Duration::from_secs(10),
//! )
//! .unwrap();
//!
//! let ctx = Context::background();
//! let buf = pool.acquire(&ctx).unwrap();
//! println!("Got buffer of {} bytes", buf.len());
//! pool.release(&ctx, buf);
//! ```

mod pool;
mod config;
mod context;
mod metrics;
mod eviction;
mod errors;

pub use pool::{Pool, PoolBuilder};
pub use config::PoolConfiguration;
pub use context::Context;
pub use metrics::{PoolMetrics, MetricsExporter};
pub use errors::{PoolError, PoolResult};
