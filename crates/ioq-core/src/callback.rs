use crate::buf::IoBuf;
use crate::execution_queue::ExecutionQueue;
use crate::result::AsyncOperationResult;

/// Invoked by the execution queue when a read/write completion arrives.
/// The execution queue passes itself back in so the callback can
/// re-submit reentrantly (e.g. `SocketOperationQueue::execute_queued`
/// tail-calling into another `add_read`) without needing a second mutable
/// borrow of the same execution queue from anywhere else.
pub type ReadWriteCallback =
    Box<dyn FnOnce(AsyncOperationResult, IoBuf, &mut dyn ExecutionQueue) + Send>;

/// Invoked by the execution queue when a standalone poll completion arrives.
pub type PollCallback = Box<dyn FnOnce(AsyncOperationResult, &mut dyn ExecutionQueue) + Send>;
