//! Trait boundaries and shared value types for the io_uring socket
//! execution core. Nothing in this crate touches a raw file descriptor or
//! the kernel; see `ioq-uring` for the concrete `ExecutionQueue` and
//! `ioq-socket` for the per-socket operation layer built on top of it.

pub mod buf;
pub mod callback;
pub mod direction;
pub mod error;
pub mod execution_queue;
pub mod io_thread;
pub mod result;

pub use buf::IoBuf;
pub use callback::{PollCallback, ReadWriteCallback};
pub use direction::Direction;
pub use error::{IoqError, Result};
pub use execution_queue::ExecutionQueue;
pub use io_thread::IoThreadPost;
pub use result::{translate_errno, AsyncOperationResult, CompletionFlags, SocketError};
