/// The result an `ExecutionQueue` callback is invoked with: either a
/// synthetic tick carrying no CQE (`NONE`, used to wake a queue that just
/// transitioned from empty to non-empty), or a signed kernel result where
/// negative means `-errno` and non-negative means a byte count / poll mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncOperationResult {
    raw: Option<i64>,
}

impl AsyncOperationResult {
    pub const NONE: Self = Self { raw: None };

    pub fn from_raw(raw: i64) -> Self {
        Self { raw: Some(raw) }
    }

    pub fn has_result(self) -> bool {
        self.raw.is_some()
    }

    pub fn raw(self) -> Option<i64> {
        self.raw
    }

    /// `Some(errno)` if this is a negative (error) kernel result.
    pub fn errno(self) -> Option<i32> {
        self.raw.filter(|&v| v < 0).map(|v| (-v) as i32)
    }

    /// `Some(bytes)` if this is a non-negative kernel result.
    pub fn bytes(self) -> Option<u32> {
        self.raw.filter(|&v| v >= 0).map(|v| v as u32)
    }
}

/// Terminal classification of how an operation ended, published to the
/// awaiting caller alongside the byte count / domain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFlags {
    /// Finished inline on the calling thread, without ever touching the ring.
    CompletedFinishedSync,
    /// Finished via the execution queue / I/O thread.
    CompletedFinishedAsync,
    /// Finished because of cancellation (cooperative, or kernel `ECANCELED`).
    CompletedCanceled,
}

/// The nearest domain-level classification of a per-operation kernel errno.
/// Not exhaustive of `errno(3)`; anything not named collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    ConnectionReset,
    ConnectionAborted,
    ConnectionRefused,
    NotConnected,
    TimedOut,
    BrokenPipe,
    AddressInUse,
    PermissionDenied,
    Other(i32),
}

impl SocketError {
    pub fn raw_errno(self) -> i32 {
        match self {
            SocketError::ConnectionReset => libc::ECONNRESET,
            SocketError::ConnectionAborted => libc::ECONNABORTED,
            SocketError::ConnectionRefused => libc::ECONNREFUSED,
            SocketError::NotConnected => libc::ENOTCONN,
            SocketError::TimedOut => libc::ETIMEDOUT,
            SocketError::BrokenPipe => libc::EPIPE,
            SocketError::AddressInUse => libc::EADDRINUSE,
            SocketError::PermissionDenied => libc::EACCES,
            SocketError::Other(errno) => errno,
        }
    }
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket error (errno {})", self.raw_errno())
    }
}

impl std::error::Error for SocketError {}

/// Translate a per-operation kernel errno (already stripped of the `EINTR`
/// / `ECANCELED` / `EAGAIN` cases handled upstream by the operation state
/// machine) into the nearest domain error code.
pub fn translate_errno(errno: i32) -> SocketError {
    match errno {
        libc::ECONNRESET => SocketError::ConnectionReset,
        libc::ECONNABORTED => SocketError::ConnectionAborted,
        libc::ECONNREFUSED => SocketError::ConnectionRefused,
        libc::ENOTCONN => SocketError::NotConnected,
        libc::ETIMEDOUT => SocketError::TimedOut,
        libc::EPIPE => SocketError::BrokenPipe,
        libc::EADDRINUSE => SocketError::AddressInUse,
        libc::EACCES => SocketError::PermissionDenied,
        other => SocketError::Other(other),
    }
}
