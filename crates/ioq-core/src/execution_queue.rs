use std::os::unix::io::RawFd;

use crate::buf::IoBuf;
use crate::callback::{PollCallback, ReadWriteCallback};
use crate::error::Result;

/// The public contract of §4.1: a thin adapter over a single `io_uring`
/// that accepts read/write/poll submissions and dispatches completions
/// back to callbacks.
///
/// All methods must be called from the single I/O thread that owns the
/// concrete ring; this trait carries no internal synchronization.
pub trait ExecutionQueue {
    /// Enqueue a read. The buffer must not be touched again by the caller
    /// until `callback` fires. `data` is an opaque 32-bit tag echoed back
    /// as part of the key; callers that want at most one outstanding
    /// operation per (fd, data) must enforce that themselves.
    fn add_read(&mut self, fd: RawFd, buf: IoBuf, data: u32, callback: ReadWriteCallback) -> Result<()>;

    /// Enqueue a write. Same buffer-ownership contract as `add_read`.
    fn add_write(&mut self, fd: RawFd, buf: IoBuf, data: u32, callback: ReadWriteCallback) -> Result<()>;

    /// Enqueue a standalone (non-linked) readiness poll.
    fn add_poll_in(&mut self, fd: RawFd, data: u32, callback: PollCallback) -> Result<()>;

    /// Enqueue a standalone (non-linked) writability poll.
    fn add_poll_out(&mut self, fd: RawFd, data: u32, callback: PollCallback) -> Result<()>;

    /// Whether this execution queue can submit a readiness poll ahead of a
    /// read/write (i.e. whether `AsyncOperation::try_execute_async` may
    /// treat a zero-byte poll-only request as cheap). All real backends in
    /// this workspace return `true`; the trait exposes it so operation code
    /// never hard-codes that assumption.
    fn supports_polling(&self) -> bool {
        true
    }
}
