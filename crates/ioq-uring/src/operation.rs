use std::os::unix::io::RawFd;

use ioq_core::{IoBuf, PollCallback, ReadWriteCallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
    PollIn,
    PollOut,
}

impl OperationKind {
    pub fn is_read_write(self) -> bool {
        matches!(self, OperationKind::Read | OperationKind::Write)
    }

    pub fn needed_sqes(self) -> usize {
        if self.is_read_write() {
            2 // linked (poll, readv/writev) pair
        } else {
            1
        }
    }
}

pub enum CallbackSlot {
    ReadWrite(ReadWriteCallback),
    Poll(PollCallback),
}

/// Pooled descriptor for one in-flight kernel request (§3, §4.2).
///
/// Reused across submissions via `OperationPool` rather than reallocated,
/// though the boxed callback closure itself is necessarily fresh per
/// submission (Rust has no portable way to reuse a `Box<dyn FnOnce>`'s
/// allocation across distinct closures).
pub struct OperationRecord {
    pub kind: OperationKind,
    pub fd: RawFd,
    pub data: u32,
    pub buf: Option<IoBuf>,
    pub iovec_idx: Option<usize>,
    pub callback: Option<CallbackSlot>,
}

impl OperationRecord {
    pub fn empty() -> Self {
        Self {
            kind: OperationKind::PollIn,
            fd: -1,
            data: 0,
            buf: None,
            iovec_idx: None,
            callback: None,
        }
    }

    pub fn reset(&mut self) {
        self.buf = None;
        self.iovec_idx = None;
        self.callback = None;
    }
}
