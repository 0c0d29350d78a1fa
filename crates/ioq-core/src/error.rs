use std::fmt;

/// Errors raised by the execution-queue layer.
///
/// Hand-rolled rather than derived via `thiserror`, matching this codebase's
/// existing error enums (see `ksvc_core::error::KsvcError`).
#[derive(Debug)]
pub enum IoqError {
    /// The kernel does not advertise a feature this core requires
    /// (`IORING_FEAT_NODROP` or `IORING_FEAT_SUBMIT_STABLE`).
    UnsupportedEnvironment { missing: &'static str },
    /// `io_uring_setup` failed; carries the raw errno.
    IoUringSetup(i32),
    /// `io_uring_enter` (submit) failed with an errno other than the
    /// swallowed `EBUSY`/`EAGAIN`.
    IoUringSubmit(i32),
    /// A raw OS error not covered by a more specific variant.
    Os(i32),
    /// The `SocketOperationQueue` has already been disposed.
    Disposed,
    /// `ExecutionQueue::add_read`/`add_write`/etc. was called with a key
    /// that already has an outstanding record. The caller contract (one
    /// in-flight operation per socket direction) forbids this; surfaced
    /// rather than silently overwritten.
    DuplicateKey,
}

impl fmt::Display for IoqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoqError::UnsupportedEnvironment { missing } => {
                write!(f, "io_uring environment unsupported: missing {missing}")
            }
            IoqError::IoUringSetup(errno) => write!(f, "io_uring_setup failed: errno {errno}"),
            IoqError::IoUringSubmit(errno) => write!(f, "io_uring submit failed: errno {errno}"),
            IoqError::Os(errno) => write!(f, "OS error: errno {errno}"),
            IoqError::Disposed => write!(f, "operation queue has been disposed"),
            IoqError::DuplicateKey => write!(f, "duplicate execution-queue key"),
        }
    }
}

impl std::error::Error for IoqError {}

pub type Result<T> = std::result::Result<T, IoqError>;
