//! The one concrete `ExecutionQueue`: owns a single `io_uring` instance,
//! submits linked (poll, readv/writev) pairs, and drains completions back
//! to callbacks. See SPEC_FULL.md §4.1.

pub mod config;
pub mod iovec_table;
pub mod key;
pub mod operation;
pub mod pool;
pub mod queue;

pub use config::ExecutionQueueConfig;
pub use queue::UringExecutionQueue;
