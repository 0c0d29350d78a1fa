use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;

use io_uring::{opcode, squeue, types, IoUring};

use ioq_core::{
    AsyncOperationResult, Direction, ExecutionQueue as ExecutionQueueTrait, IoBuf, IoqError,
    PollCallback, ReadWriteCallback, Result,
};

use crate::config::ExecutionQueueConfig;
use crate::iovec_table::IovecTable;
use crate::key::{is_poll_completion, key, poll_key};
use crate::operation::{CallbackSlot, OperationKind, OperationRecord};
use crate::pool::OperationPool;

/// The one concrete `ExecutionQueue`: owns a single `io_uring` instance
/// and drives submission/completion per §4.1.
pub struct UringExecutionQueue {
    ring: IoUring,
    operations: HashMap<u64, OperationRecord>,
    new_operations: VecDeque<u64>,
    new_operations_queued: usize,
    pool: OperationPool,
    iovec_table: IovecTable,
    sqes_queued: u32,
    sq_capacity: usize,
}

impl UringExecutionQueue {
    pub fn new(config: ExecutionQueueConfig) -> Result<Self> {
        let ring = IoUring::builder()
            .build(config.sq_entries)
            .map_err(|e| IoqError::IoUringSetup(e.raw_os_error().unwrap_or(-1)))?;

        let params = ring.params();
        if !params.is_feature_nodrop() {
            return Err(IoqError::UnsupportedEnvironment {
                missing: "IORING_FEAT_NODROP",
            });
        }
        if !params.is_feature_submit_stable() {
            return Err(IoqError::UnsupportedEnvironment {
                missing: "IORING_FEAT_SUBMIT_STABLE",
            });
        }

        // One iovec per concurrently submittable read/write; each such op
        // consumes two SQE slots, so half the SQ depth is a safe upper bound.
        let iovec_capacity = (config.sq_entries as usize / 2).max(1);

        Ok(Self {
            sq_capacity: config.sq_entries as usize,
            ring,
            operations: HashMap::new(),
            new_operations: VecDeque::new(),
            new_operations_queued: 0,
            pool: OperationPool::new(),
            iovec_table: IovecTable::new(iovec_capacity),
            sqes_queued: 0,
        })
    }

    fn enqueue_new(
        &mut self,
        kind: OperationKind,
        fd: RawFd,
        data: u32,
        buf: Option<IoBuf>,
        callback: CallbackSlot,
    ) -> Result<()> {
        let k = key(fd, data);
        if self.operations.contains_key(&k) {
            return Err(IoqError::DuplicateKey);
        }
        let mut record = self.pool.rent();
        record.kind = kind;
        record.fd = fd;
        record.data = data;
        record.buf = buf;
        record.iovec_idx = None;
        record.callback = Some(callback);
        self.operations.insert(k, record);
        self.new_operations.push_back(k);
        Ok(())
    }

    /// Encode as many `new_operations` as free SQE slots and iovec entries
    /// allow (§4.1 "Submission pacing"). Does not remove entries from
    /// `new_operations`; that only happens once a batch is confirmed fully
    /// submitted, tracked via `new_operations_queued`.
    fn write_submissions(&mut self) {
        let mut idx = self.new_operations_queued;
        while idx < self.new_operations.len() {
            let k = self.new_operations[idx];
            let kind = self.operations.get(&k).expect("new_operations key must exist").kind;

            let needed_sqes = kind.needed_sqes();
            let free_sqes = self.sq_capacity.saturating_sub(self.sqes_queued as usize);
            if free_sqes < needed_sqes {
                break;
            }
            if kind.is_read_write() && self.iovec_table.free_count() == 0 {
                break;
            }

            self.encode_one(k, kind);
            self.new_operations_queued += 1;
            idx += 1;
        }
    }

    fn encode_one(&mut self, k: u64, kind: OperationKind) {
        let fd = types::Fd(self.operations[&k].fd);
        let data = self.operations[&k].data;

        match kind {
            OperationKind::Read | OperationKind::Write => {
                let record = self.operations.get_mut(&k).expect("record present");
                let buf = record.buf.as_mut().expect("read/write op must carry a buffer");
                let ptr = buf.as_mut_slice().as_mut_ptr();
                let len = buf.as_mut_slice().len();
                let iovec_idx = self
                    .iovec_table
                    .acquire(ptr, len)
                    .expect("write_submissions reserved an iovec slot for this op");
                self.operations.get_mut(&k).unwrap().iovec_idx = Some(iovec_idx);

                let direction = if kind == OperationKind::Read {
                    Direction::Read
                } else {
                    Direction::Write
                };
                let poll_sqe = opcode::PollAdd::new(fd, direction.poll_mask())
                    .build()
                    .user_data(poll_key(fd.0, data))
                    .flags(squeue::Flags::IO_LINK);

                let iov_ptr = self.iovec_table.ptr(iovec_idx);
                let rw_sqe = if kind == OperationKind::Read {
                    opcode::Readv::new(fd, iov_ptr, 1).build().user_data(k)
                } else {
                    opcode::Writev::new(fd, iov_ptr, 1).build().user_data(k)
                };

                unsafe {
                    self.ring
                        .submission()
                        .push(&poll_sqe)
                        .expect("write_submissions reserved an SQE slot for the poll half");
                    self.ring
                        .submission()
                        .push(&rw_sqe)
                        .expect("write_submissions reserved an SQE slot for the rw half");
                }
                self.sqes_queued += 2;
            }
            OperationKind::PollIn | OperationKind::PollOut => {
                let mask = if kind == OperationKind::PollIn {
                    libc::POLLIN as u32
                } else {
                    libc::POLLOUT as u32
                };
                let sqe = opcode::PollAdd::new(fd, mask).build().user_data(k);
                unsafe {
                    self.ring
                        .submission()
                        .push(&sqe)
                        .expect("write_submissions reserved an SQE slot for this poll");
                }
                self.sqes_queued += 1;
            }
        }
    }

    /// §4.1 "Submit-and-wait loop". Encodes a batch if none is currently
    /// pending, submits it, and either clears the encoded batch (full
    /// acceptance) or leaves it for the next call to retry.
    pub fn submit_and_wait(&mut self, may_wait: bool) -> Result<()> {
        if self.sqes_queued == 0 {
            self.write_submissions();
        }
        if self.sqes_queued == 0 {
            // Nothing encoded (ring full of in-flight ops, or truly idle).
            if may_wait {
                match self.ring.submit_and_wait(1) {
                    Ok(_) => {}
                    Err(e) => return Self::translate_submit_error(e),
                }
            }
            return Ok(());
        }

        let more_batches_remain = self.new_operations_queued < self.new_operations.len();
        let min_complete = if may_wait && !more_batches_remain { 1 } else { 0 };

        match self.ring.submit_and_wait(min_complete) {
            Ok(submitted) => {
                if submitted as u32 == self.sqes_queued {
                    self.new_operations.drain(0..self.new_operations_queued);
                    self.new_operations_queued = 0;
                    self.sqes_queued = 0;
                } else {
                    // Open question in SPEC_FULL.md §7/§9: log and retry.
                    eprintln!(
                        "ioq-uring: partial submission ({submitted}/{}); retrying next loop",
                        self.sqes_queued
                    );
                }
                Ok(())
            }
            Err(e) => Self::translate_submit_error(e),
        }
    }

    fn translate_submit_error(e: std::io::Error) -> Result<()> {
        match e.raw_os_error() {
            Some(errno) if errno == libc::EBUSY || errno == libc::EAGAIN => Ok(()),
            other => Err(IoqError::IoUringSubmit(other.unwrap_or(-1))),
        }
    }

    /// Drain all ready CQEs, invoking each tracked record's callback.
    /// Returns the number of (non-poll) completions dispatched.
    pub fn execute_completions(&mut self) -> usize {
        let raw: Vec<(u64, i64)> = self
            .ring
            .completion()
            .map(|cqe| (cqe.user_data(), cqe.result() as i64))
            .collect();

        let mut dispatched = 0;
        for (user_data, result) in raw {
            if is_poll_completion(user_data) {
                continue;
            }
            match self.operations.remove(&user_data) {
                Some(mut record) => {
                    if let Some(idx) = record.iovec_idx.take() {
                        self.iovec_table.release(idx);
                    }
                    let callback = record.callback.take();
                    let buf = record.buf.take();
                    self.pool.release(record);

                    match callback {
                        Some(CallbackSlot::ReadWrite(f)) => {
                            f(
                                AsyncOperationResult::from_raw(result),
                                buf.expect("read/write completion must carry a buffer"),
                                self,
                            );
                        }
                        Some(CallbackSlot::Poll(f)) => {
                            f(AsyncOperationResult::from_raw(result), self);
                        }
                        None => {}
                    }
                    dispatched += 1;
                }
                None => {
                    eprintln!(
                        "ioq-uring: completion for unregistered key {user_data:#x} (result={result}); dropping"
                    );
                }
            }
        }
        dispatched
    }
}

impl ExecutionQueueTrait for UringExecutionQueue {
    fn add_read(&mut self, fd: RawFd, buf: IoBuf, data: u32, callback: ReadWriteCallback) -> Result<()> {
        self.enqueue_new(OperationKind::Read, fd, data, Some(buf), CallbackSlot::ReadWrite(callback))
    }

    fn add_write(&mut self, fd: RawFd, buf: IoBuf, data: u32, callback: ReadWriteCallback) -> Result<()> {
        self.enqueue_new(OperationKind::Write, fd, data, Some(buf), CallbackSlot::ReadWrite(callback))
    }

    fn add_poll_in(&mut self, fd: RawFd, data: u32, callback: PollCallback) -> Result<()> {
        self.enqueue_new(OperationKind::PollIn, fd, data, None, CallbackSlot::Poll(callback))
    }

    fn add_poll_out(&mut self, fd: RawFd, data: u32, callback: PollCallback) -> Result<()> {
        self.enqueue_new(OperationKind::PollOut, fd, data, None, CallbackSlot::Poll(callback))
    }
}

// `UringExecutionQueue::new` only returns `Ok` once every field has been
// constructed; an error from any fallible step unwinds via `?` and drops
// whatever was built so far through their own `Drop` impls (the ring in
// particular). There is no half-constructed `UringExecutionQueue` to leak
// or misuse — construction is all-or-nothing for free (§9 open question).
// `Dispose()` is likewise just `Drop`: releasing the ring and iovec table
// needs no custom logic beyond what their own destructors already do.

#[cfg(test)]
mod tests {
    use super::*;

    fn try_new_queue() -> Option<UringExecutionQueue> {
        match UringExecutionQueue::new(ExecutionQueueConfig::default().with_sq_entries(8)) {
            Ok(q) => Some(q),
            Err(IoqError::UnsupportedEnvironment { missing }) => {
                eprintln!("skipping: io_uring feature unavailable in this environment: {missing}");
                None
            }
            Err(IoqError::IoUringSetup(errno)) => {
                eprintln!("skipping: io_uring_setup failed (errno {errno}); no io_uring in this environment");
                None
            }
            Err(e) => panic!("unexpected error constructing UringExecutionQueue: {e}"),
        }
    }

    #[test]
    fn construction_and_disposal_round_trip() {
        let Some(queue) = try_new_queue() else { return };
        drop(queue); // Dispose() == Drop
    }

    #[test]
    fn poll_only_submission_and_completion() {
        let Some(mut queue) = try_new_queue() else { return };

        // socketpair gives us a real, always-readable fd pair to poll.
        let mut fds = [0i32; 2];
        let rc = unsafe {
            libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
        };
        assert_eq!(rc, 0);
        let (a, b) = (fds[0], fds[1]);

        unsafe {
            libc::write(b, b"x".as_ptr() as *const libc::c_void, 1);
        }

        let fired = std::sync::Arc::new(std::sync::Mutex::new(None));
        let fired2 = fired.clone();
        queue
            .add_poll_in(
                a,
                libc::POLLIN as u32,
                Box::new(move |result, _exec| {
                    *fired2.lock().unwrap() = Some(result);
                }),
            )
            .unwrap();

        for _ in 0..50 {
            queue.submit_and_wait(true).unwrap();
            if queue.execute_completions() > 0 {
                break;
            }
        }

        let got = fired.lock().unwrap().take();
        assert!(got.is_some(), "poll completion should have fired");
        assert!(got.unwrap().bytes().unwrap_or(0) > 0, "POLLIN should be set");

        unsafe {
            libc::close(a);
            libc::close(b);
        }
    }
}
