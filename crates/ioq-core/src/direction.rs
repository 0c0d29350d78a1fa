/// Read-side or write-side of a socket. Each direction owns an independent
/// `SocketOperationQueue` and uses a different poll mask when submitting to
/// the `ExecutionQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// The `data` tag threaded through `ExecutionQueue::add_*`/key encoding.
    /// Using the POLLIN/POLLOUT mask value directly keeps a read-direction
    /// queue and a write-direction queue on the same fd from colliding.
    pub fn poll_mask(self) -> u32 {
        match self {
            Direction::Read => libc::POLLIN as u32,
            Direction::Write => libc::POLLOUT as u32,
        }
    }
}
