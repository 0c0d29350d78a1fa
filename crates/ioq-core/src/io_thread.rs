use crate::execution_queue::ExecutionQueue;

/// The contract `SocketOperationQueue` needs from the (out-of-scope) I/O
/// thread collaborator: an asynchronous cross-thread wake-up that
/// delivers a callable onto the thread that owns the `ExecutionQueue`.
///
/// The posted work receives `&mut dyn ExecutionQueue` because the only
/// thing worth posting is "re-enter `ExecuteQueued`", which needs the
/// execution queue to submit into.
pub trait IoThreadPost: Send + Sync {
    fn post(&self, work: Box<dyn FnOnce(&mut dyn ExecutionQueue) + Send>);
}
