use std::os::unix::io::RawFd;

use ioq_core::{CompletionFlags, Direction, ExecutionQueue, IoBuf};

use crate::outcome::{SyncOutcome, TryExecuteOutcome};
use crate::queue::RequeueHandle;

/// A concrete operation state machine, illustrated by socket receive in
/// SPEC_FULL.md §4.4. Required methods describe the operation's payload
/// and its two raw syscall hooks (`try_sync_raw`, used for both the
/// client-thread fast path and the I/O-thread synchronous fallback); the
/// orchestration methods (`try_sync`, `try_execute_async`,
/// `handle_async_result`, `try_execute`) are default trait methods shared
/// by every concrete operation.
pub trait AsyncOperation: Send {
    fn direction(&self) -> Direction;
    fn fd(&self) -> RawFd;

    /// Length of the request's buffer. Zero means this is a poll-only
    /// "is it ready?" probe (§4.4).
    fn requested_len(&self) -> usize;

    fn is_cancellation_requested(&self) -> bool;
    fn request_cancellation(&self);

    /// Move the buffer out for submission to the execution queue.
    /// Panics if the buffer is not currently held by the operation;
    /// callers (the default trait methods below) only call this when
    /// they know the buffer is present.
    fn take_buf(&mut self) -> IoBuf;

    /// Restore a buffer handed back through a completion callback.
    fn put_buf(&mut self, buf: IoBuf);

    /// Perform the operation's non-blocking syscall once. Returns the raw
    /// kernel result: non-negative byte count, or `-errno`. Must never
    /// block (callers pass `MSG_DONTWAIT` or rely on `O_NONBLOCK`).
    fn try_sync_raw(&mut self) -> i64;

    /// Record a terminal (non-retryable) raw result's byte count / domain
    /// error. Does not touch `CompletionFlags`; callers set those
    /// separately depending on which path finished the operation.
    fn apply_result(&mut self, raw: i64);

    fn set_flags(&mut self, flags: CompletionFlags);

    /// Record that this operation ended via cancellation.
    fn mark_cancelled(&mut self);

    /// Fire the stored continuation with the final outcome. Consuming by
    /// value matches this codebase's ownership style for one-shot
    /// completions; there is no reuse of a completed operation.
    fn complete(self: Box<Self>);

    /// §4.4 `TryExecuteSync`.
    fn try_sync(&mut self) -> SyncOutcome {
        let raw = self.try_sync_raw();
        if is_would_block(raw) {
            SyncOutcome::WouldBlock
        } else {
            self.apply_result(raw);
            SyncOutcome::Completed
        }
    }

    /// §4.4 `TryExecuteAsync`.
    fn try_execute_async(
        &mut self,
        triggered_by_poll: bool,
        exec: &mut dyn ExecutionQueue,
        data: u32,
        requeue: &RequeueHandle,
    ) -> TryExecuteOutcome {
        let poll_only = self.requested_len() == 0;
        if !poll_only || exec.supports_polling() {
            let buf = self.take_buf();
            let fd = self.fd();
            let submitted = match self.direction() {
                Direction::Read => exec.add_read(fd, buf, data, requeue.read_write_callback()),
                Direction::Write => exec.add_write(fd, buf, data, requeue.read_write_callback()),
            };
            match submitted {
                Ok(()) => TryExecuteOutcome::Executing,
                Err(_) => {
                    // The caller contract (one in-flight op per socket
                    // direction) should make a submission failure here
                    // unreachable; translate defensively rather than panic.
                    self.apply_result(-(libc::EIO as i64));
                    self.set_flags(CompletionFlags::CompletedFinishedAsync);
                    TryExecuteOutcome::Finished
                }
            }
        } else if triggered_by_poll {
            self.apply_result(0);
            self.set_flags(CompletionFlags::CompletedFinishedAsync);
            TryExecuteOutcome::Finished
        } else {
            match self.try_sync() {
                SyncOutcome::Completed => {
                    self.set_flags(CompletionFlags::CompletedFinishedAsync);
                    TryExecuteOutcome::Finished
                }
                SyncOutcome::WouldBlock => TryExecuteOutcome::WaitForPoll,
            }
        }
    }

    /// §4.4 `HandleAsyncResultAndContinue`.
    fn handle_async_result(
        &mut self,
        result: ioq_core::AsyncOperationResult,
        exec: &mut dyn ExecutionQueue,
        data: u32,
        requeue: &RequeueHandle,
    ) -> TryExecuteOutcome {
        let raw = result
            .raw()
            .expect("handle_async_result requires a CQE-carrying result");

        enum Intermediate {
            Resubmit,
            Cancelled,
            WaitForPoll,
            Finished,
        }

        let intermediate = if raw == -(libc::EINTR as i64) {
            Intermediate::Resubmit
        } else if raw == -(libc::ECANCELED as i64) {
            Intermediate::Cancelled
        } else if is_would_block(raw) {
            Intermediate::WaitForPoll
        } else {
            self.apply_result(raw);
            Intermediate::Finished
        };

        // The cancellation check applies regardless of which branch above
        // was taken, including a just-recorded success: a late success
        // racing a cancellation request is resolved in favor of
        // cancellation here. See DESIGN.md for the rationale.
        if matches!(intermediate, Intermediate::Cancelled) || self.is_cancellation_requested() {
            self.mark_cancelled();
            return TryExecuteOutcome::Finished;
        }

        match intermediate {
            Intermediate::Finished => {
                self.set_flags(CompletionFlags::CompletedFinishedAsync);
                TryExecuteOutcome::Finished
            }
            Intermediate::WaitForPoll if !exec.supports_polling() => TryExecuteOutcome::WaitForPoll,
            _ => self.try_execute_async(true, exec, data, requeue),
        }
    }

    /// Single entry point called by `SocketOperationQueue::execute_queued`
    /// (§4.3 step 4), dispatching to either a fresh submission or result
    /// interpretation depending on whether `incoming` carries a CQE.
    fn try_execute(
        &mut self,
        triggered_by_poll: bool,
        exec: &mut dyn ExecutionQueue,
        data: u32,
        incoming: ioq_core::AsyncOperationResult,
        incoming_buf: Option<IoBuf>,
        requeue: &RequeueHandle,
    ) -> TryExecuteOutcome {
        if let Some(buf) = incoming_buf {
            self.put_buf(buf);
        }
        if incoming.has_result() {
            self.handle_async_result(incoming, exec, data, requeue)
        } else {
            self.try_execute_async(triggered_by_poll, exec, data, requeue)
        }
    }
}

fn is_would_block(raw: i64) -> bool {
    raw == -(libc::EAGAIN as i64) || raw == -(libc::EWOULDBLOCK as i64)
}
