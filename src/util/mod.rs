//! Small synchronization primitives used by the executor.

pub mod semaphore;

pub use semaphore::Semaphore;
