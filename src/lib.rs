//! tidepool - a fixed-size worker thread pool with idle-aware dispatch and
//! push-based work donation.
//!
//! Producers submit short, non-blocking tasks; the pool steers each
//! submission toward an idle worker when one exists, keeps a worker's own
//! submissions on its lock-free private queue, and redistributes bursts by
//! having busy workers donate batches of queued work to idle peers. Workers
//! park when out of work and retire their OS thread after a configurable
//! idle period; a later submission transparently respawns it.
//!
//! # Quick Start
//!
//! ```no_run
//! use tidepool::{Config, ThreadPool};
//!
//! let config = Config::builder()
//!     .pool_name("app")
//!     .pool_size(4)
//!     .build()
//!     .unwrap();
//!
//! let pool = ThreadPool::new(&config).unwrap();
//!
//! pool.execute(|| {
//!     println!("hello from a worker thread");
//! })
//! .unwrap();
//!
//! pool.shutdown();
//! ```
//!
//! # Shutdown semantics
//!
//! [`ThreadPool::shutdown`] is idempotent: the first call joins every worker
//! thread and interrupts every task still queued, so each submitted task is
//! either executed or interrupted exactly once. Dropping the pool performs
//! the same shutdown.

#![warn(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod util;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::{Task, TaskId, ThreadPool};
