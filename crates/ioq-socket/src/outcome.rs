use ioq_core::CompletionFlags;

/// Outcome of `AsyncOperation::try_sync` (§4.4 `TryExecuteSync`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    WouldBlock,
}

/// Outcome visible to `SocketOperationQueue::execute_queued` (§4.3 steps
/// 5/7/8). Note there is no separate `Cancelled` variant here: a cancelled
/// operation reaches `Finished` with `CompletionFlags::CompletedCanceled`
/// already recorded on it. See SPEC_FULL.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryExecuteOutcome {
    Executing,
    WaitForPoll,
    Finished,
}

/// The final result delivered to a caller's continuation once an
/// operation reaches `CompletionFlags::Completed*` (§4.4, §7). `error` is
/// `None` both for pure byte-count successes and for a poll-only probe
/// that simply confirmed readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationOutcome {
    pub bytes_transferred: u32,
    pub error: Option<ioq_core::SocketError>,
    pub flags: CompletionFlags,
}
