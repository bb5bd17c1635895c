//! Error types for the tidepool scheduler.

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while submitting work to or tearing down a pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pool (or the targeted worker) is shutting down; the submission was
    /// rejected. Also recognized when a task surfaces it from `resume`, in
    /// which case the executing worker exits its work loop cleanly.
    #[error("thread pool `{0}` is shut down")]
    Shutdown(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Error {
    /// Create a shutdown error carrying the pool name.
    pub fn shutdown<S: Into<String>>(pool: S) -> Self {
        Error::Shutdown(pool.into())
    }

    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this is the distinguished shutdown signal.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Shutdown(_))
    }
}
