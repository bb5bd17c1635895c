//! Convenient re-exports for common tidepool types.
//!
//! This module provides a single import for most use cases:
//! ```
//! use tidepool::prelude::*;
//! ```

pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::executor::{Task, TaskId, ThreadPool};
