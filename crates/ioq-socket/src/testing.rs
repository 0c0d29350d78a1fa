use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use ioq_core::{AsyncOperationResult, ExecutionQueue, IoBuf, PollCallback, ReadWriteCallback, Result};

enum PendingEntry {
    ReadWrite {
        buf: Option<IoBuf>,
        callback: ReadWriteCallback,
    },
    Poll {
        callback: PollCallback,
    },
}

/// An in-memory stand-in for `UringExecutionQueue`, used to drive
/// `AsyncOperation`/`SocketOperationQueue` scenarios deterministically
/// without a real kernel ring (SPEC_FULL.md §8/§10.4). Submissions are
/// recorded in FIFO order; `complete_next` pops the oldest one and invokes
/// its callback with a scripted raw result, exactly as a real CQE would.
pub struct FakeExecutionQueue {
    pending: VecDeque<PendingEntry>,
    supports_polling: bool,
}

impl FakeExecutionQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            supports_polling: true,
        }
    }

    /// A variant modeling a backend that cannot submit a standalone
    /// readiness poll ahead of a zero-length probe, forcing
    /// `AsyncOperation::try_execute_async` down its synchronous-retry /
    /// `WaitForPoll` path instead of submitting to the queue.
    pub fn without_polling_support() -> Self {
        Self {
            pending: VecDeque::new(),
            supports_polling: false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Complete the oldest pending submission with a raw kernel result
    /// (negative for `-errno`, non-negative for a byte count / poll mask).
    /// Panics if nothing is pending.
    pub fn complete_next(&mut self, raw: i64) {
        let entry = self.pending.pop_front().expect("no pending submission to complete");
        match entry {
            PendingEntry::ReadWrite { buf, callback } => {
                let buf = buf.expect("read/write submission must carry a buffer");
                callback(AsyncOperationResult::from_raw(raw), buf, self);
            }
            PendingEntry::Poll { callback } => {
                callback(AsyncOperationResult::from_raw(raw), self);
            }
        }
    }
}

impl Default for FakeExecutionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionQueue for FakeExecutionQueue {
    fn add_read(&mut self, _fd: RawFd, buf: IoBuf, _data: u32, callback: ReadWriteCallback) -> Result<()> {
        self.pending.push_back(PendingEntry::ReadWrite {
            buf: Some(buf),
            callback,
        });
        Ok(())
    }

    fn add_write(&mut self, _fd: RawFd, buf: IoBuf, _data: u32, callback: ReadWriteCallback) -> Result<()> {
        self.pending.push_back(PendingEntry::ReadWrite {
            buf: Some(buf),
            callback,
        });
        Ok(())
    }

    fn add_poll_in(&mut self, _fd: RawFd, _data: u32, callback: PollCallback) -> Result<()> {
        self.pending.push_back(PendingEntry::Poll { callback });
        Ok(())
    }

    fn add_poll_out(&mut self, _fd: RawFd, _data: u32, callback: PollCallback) -> Result<()> {
        self.pending.push_back(PendingEntry::Poll { callback });
        Ok(())
    }

    fn supports_polling(&self) -> bool {
        self.supports_polling
    }
}
