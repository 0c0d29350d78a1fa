use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use ioq_core::{translate_errno, CompletionFlags, Direction, IoBuf};

use crate::async_operation::AsyncOperation;
use crate::outcome::OperationOutcome;

/// A single `recv(2)` against one fd, driven through the `AsyncOperation`
/// state machine. One `SocketRecvOperation` is retired (`complete`'d) at
/// most once; a caller that wants another read constructs a new one.
pub struct SocketRecvOperation {
    fd: RawFd,
    requested_len: usize,
    buf: Option<IoBuf>,
    cancel_requested: AtomicBool,
    bytes_transferred: u32,
    error: Option<ioq_core::SocketError>,
    flags: Option<CompletionFlags>,
    on_complete: Option<Box<dyn FnOnce(OperationOutcome) + Send>>,
}

impl SocketRecvOperation {
    pub fn new(
        fd: RawFd,
        len: usize,
        on_complete: Box<dyn FnOnce(OperationOutcome) + Send>,
    ) -> Self {
        Self {
            fd,
            requested_len: len,
            buf: Some(IoBuf::zeroed(len)),
            cancel_requested: AtomicBool::new(false),
            bytes_transferred: 0,
            error: None,
            flags: None,
            on_complete: Some(on_complete),
        }
    }
}

impl AsyncOperation for SocketRecvOperation {
    fn direction(&self) -> Direction {
        Direction::Read
    }

    fn fd(&self) -> RawFd {
        self.fd
    }

    fn requested_len(&self) -> usize {
        self.requested_len
    }

    fn is_cancellation_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn request_cancellation(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn take_buf(&mut self) -> IoBuf {
        self.buf.take().expect("recv operation's buffer already taken")
    }

    fn put_buf(&mut self, buf: IoBuf) {
        self.buf = Some(buf);
    }

    fn try_sync_raw(&mut self) -> i64 {
        let buf = self
            .buf
            .as_mut()
            .expect("try_sync_raw called without a buffer present");
        let slice = buf.as_mut_slice();
        // SAFETY: `slice` is a valid, uniquely-borrowed buffer of `slice.len()`
        // bytes for the duration of this call; `recv` writes at most that many.
        let ret = unsafe {
            libc::recv(
                self.fd,
                slice.as_mut_ptr() as *mut libc::c_void,
                slice.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if ret < 0 {
            -(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO) as i64)
        } else {
            ret as i64
        }
    }

    fn apply_result(&mut self, raw: i64) {
        if raw < 0 {
            self.bytes_transferred = 0;
            self.error = Some(translate_errno((-raw) as i32));
        } else {
            self.bytes_transferred = raw as u32;
            self.error = None;
        }
    }

    fn set_flags(&mut self, flags: CompletionFlags) {
        self.flags = Some(flags);
    }

    fn mark_cancelled(&mut self) {
        self.flags = Some(CompletionFlags::CompletedCanceled);
    }

    fn complete(mut self: Box<Self>) {
        let outcome = OperationOutcome {
            bytes_transferred: self.bytes_transferred,
            error: self.error,
            flags: self.flags.unwrap_or(CompletionFlags::CompletedFinishedAsync),
        };
        if let Some(cb) = self.on_complete.take() {
            cb(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixDatagram;
    use std::sync::mpsc;

    #[test]
    fn sync_recv_from_socketpair() {
        let (a, b) = UnixDatagram::pair().expect("socketpair");
        b.send(b"hello").unwrap();

        let (tx, rx) = mpsc::channel();
        let mut op = SocketRecvOperation::new(
            a.as_raw_fd(),
            16,
            Box::new(move |outcome| {
                tx.send(outcome).unwrap();
            }),
        );

        match op.try_sync() {
            crate::outcome::SyncOutcome::Completed => {
                op.set_flags(CompletionFlags::CompletedFinishedSync);
            }
            crate::outcome::SyncOutcome::WouldBlock => panic!("data was already sent"),
        }
        Box::new(op).complete();

        let outcome = rx.recv().unwrap();
        assert_eq!(outcome.bytes_transferred, 5);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.flags, CompletionFlags::CompletedFinishedSync);
    }

    #[test]
    fn would_block_on_empty_socket() {
        let (a, _b) = UnixDatagram::pair().expect("socketpair");
        let mut op = SocketRecvOperation::new(a.as_raw_fd(), 16, Box::new(|_| {}));
        assert_eq!(op.try_sync(), crate::outcome::SyncOutcome::WouldBlock);
    }
}
