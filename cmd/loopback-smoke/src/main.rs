//! Loopback Smoke Test
//!
//! Exercises the full stack end to end over a real `socketpair(2)`:
//!   Part A — UringExecutionQueue construction/disposal
//!   Part B — SocketOperationQueue: single async recv/send round trip
//!   Part C — FIFO ordering of several queued recvs on one direction
//!   Part D — Dispose() cancels everything still queued
//!
//! Run: ./target/release/loopback-smoke

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ioq_core::{CompletionFlags, Direction, ExecutionQueue, IoBuf, IoThreadPost};
use ioq_socket::{OperationOutcome, SocketOperationQueue, SocketRecvOperation, SocketSendOperation};
use ioq_uring::{ExecutionQueueConfig, UringExecutionQueue};

const LINE: &str = "────────────────────────────────────────────────────────────";

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{LINE}");
        println!("  {name}");
        println!("{LINE}");
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        self.total += 1;
        if ok {
            self.passed += 1;
            println!("  [{:2}] {:<52} PASS", self.total, name);
        } else {
            self.failed += 1;
            println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
        }
    }

    fn summary(&self) {
        println!("\n{LINE}");
        println!("  Total: {}  Passed: {}  Failed: {}", self.total, self.passed, self.failed);
        println!("{LINE}");
    }
}

/// Stands in for the out-of-scope I/O thread: posted work is buffered and
/// drained inline by `pump`, on whatever thread happens to call it. Good
/// enough for a single-threaded smoke test; a real service would hand this
/// off to a dedicated thread loop instead.
#[derive(Clone, Default)]
struct InlineIoThread {
    pending: Arc<Mutex<VecDeque<Box<dyn FnOnce(&mut dyn ExecutionQueue) + Send>>>>,
}

impl IoThreadPost for InlineIoThread {
    fn post(&self, work: Box<dyn FnOnce(&mut dyn ExecutionQueue) + Send>) {
        self.pending.lock().unwrap().push_back(work);
    }
}

impl InlineIoThread {
    fn drain(&self, exec: &mut dyn ExecutionQueue) {
        loop {
            let next = self.pending.lock().unwrap().pop_front();
            match next {
                Some(work) => work(exec),
                None => break,
            }
        }
    }
}

/// Submit/complete/drain until `done` returns true or the budget runs out.
fn pump(exec: &mut UringExecutionQueue, io_thread: &InlineIoThread, mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..2000 {
        if done() {
            return true;
        }
        io_thread.drain(exec);
        exec.submit_and_wait(true).expect("submit_and_wait");
        exec.execute_completions();
        io_thread.drain(exec);
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    done()
}

fn make_socketpair() -> (i32, i32) {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "socketpair failed");
    (fds[0], fds[1])
}

fn test_construction(t: &mut TestRunner) -> Option<UringExecutionQueue> {
    t.section("Part A: UringExecutionQueue construction/disposal");
    match UringExecutionQueue::new(ExecutionQueueConfig::default().with_sq_entries(64)) {
        Ok(q) => {
            t.check("construct UringExecutionQueue(sq_entries=64)", true, "");
            Some(q)
        }
        Err(e) => {
            t.check("construct UringExecutionQueue(sq_entries=64)", false, &format!("{e}"));
            println!("       (is io_uring available in this environment?)");
            None
        }
    }
}

fn test_single_round_trip(t: &mut TestRunner, exec: &mut UringExecutionQueue) {
    t.section("Part B: single async recv/send round trip");

    let (a, b) = make_socketpair();
    let io_thread = InlineIoThread::default();
    let recv_queue = SocketOperationQueue::new(Direction::Read, Box::new(io_thread.clone()));

    let received: Arc<Mutex<Option<OperationOutcome>>> = Arc::new(Mutex::new(None));
    let received2 = received.clone();
    let op = SocketRecvOperation::new(
        a,
        64,
        Box::new(move |outcome| {
            *received2.lock().unwrap() = Some(outcome);
        }),
    );
    recv_queue.execute_async(Box::new(op), true).expect("queue not disposed");

    unsafe {
        libc::write(b, b"ping".as_ptr() as *const libc::c_void, 4);
    }

    let got = pump(exec, &io_thread, || received.lock().unwrap().is_some());
    t.check("recv completion observed", got, "timed out waiting for completion");

    if let Some(outcome) = received.lock().unwrap().take() {
        t.check(
            &format!("recv byte count == 4 (got {})", outcome.bytes_transferred),
            outcome.bytes_transferred == 4,
            "wrong byte count",
        );
        t.check(
            "recv completed without error",
            outcome.error.is_none(),
            &format!("{:?}", outcome.error),
        );
    }

    unsafe {
        libc::close(a);
        libc::close(b);
    }
}

fn test_send_round_trip(t: &mut TestRunner, exec: &mut UringExecutionQueue) {
    t.section("Part B2: single async send, verified via plain recv(2)");

    let (a, b) = make_socketpair();
    let io_thread = InlineIoThread::default();
    let send_queue = SocketOperationQueue::new(Direction::Write, Box::new(io_thread.clone()));

    let sent: Arc<Mutex<Option<OperationOutcome>>> = Arc::new(Mutex::new(None));
    let sent2 = sent.clone();
    let op = SocketSendOperation::new(
        a,
        IoBuf::new(b"pong!".to_vec().into_boxed_slice()),
        Box::new(move |outcome| {
            *sent2.lock().unwrap() = Some(outcome);
        }),
    );
    send_queue.execute_async(Box::new(op), true).expect("queue not disposed");

    let got = pump(exec, &io_thread, || sent.lock().unwrap().is_some());
    t.check("send completion observed", got, "timed out waiting for completion");

    if let Some(outcome) = sent.lock().unwrap().take() {
        t.check(
            &format!("send byte count == 5 (got {})", outcome.bytes_transferred),
            outcome.bytes_transferred == 5,
            "wrong byte count",
        );
    }

    let mut buf = [0u8; 16];
    let n = unsafe { libc::recv(b, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    t.check(
        &format!("peer observed {n} bytes via plain recv(2)"),
        n == 5 && &buf[..5] == b"pong!",
        "payload mismatch",
    );

    unsafe {
        libc::close(a);
        libc::close(b);
    }
}

fn test_fifo_ordering(t: &mut TestRunner, exec: &mut UringExecutionQueue) {
    t.section("Part C: FIFO ordering of queued recvs on one direction");

    let (a, b) = make_socketpair();
    let io_thread = InlineIoThread::default();
    let recv_queue = SocketOperationQueue::new(Direction::Read, Box::new(io_thread.clone()));

    let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3u8 {
        let order2 = order.clone();
        let op = SocketRecvOperation::new(
            a,
            1,
            Box::new(move |outcome| {
                order2.lock().unwrap().push(outcome.bytes_transferred as u8);
            }),
        );
        recv_queue.execute_async(Box::new(op), false).expect("queue not disposed");
        let _ = i;
    }

    for _ in 0..3 {
        unsafe {
            libc::write(b, b"x".as_ptr() as *const libc::c_void, 1);
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let got = pump(exec, &io_thread, || order.lock().unwrap().len() == 3);
    t.check("all three queued recvs completed", got, "timed out");
    t.check(
        "completions observed in submission order",
        *order.lock().unwrap() == vec![1, 1, 1],
        &format!("{:?}", order.lock().unwrap()),
    );

    unsafe {
        libc::close(a);
        libc::close(b);
    }
}

fn test_dispose_cancels_queued(t: &mut TestRunner) {
    t.section("Part D: Dispose() cancels everything still queued");

    let (a, b) = make_socketpair();
    let io_thread = InlineIoThread::default();
    let recv_queue = SocketOperationQueue::new(Direction::Read, Box::new(io_thread));

    let flags: Arc<Mutex<Vec<CompletionFlags>>> = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..2 {
        let flags2 = flags.clone();
        let op = SocketRecvOperation::new(
            a,
            1,
            Box::new(move |outcome| {
                flags2.lock().unwrap().push(outcome.flags);
            }),
        );
        recv_queue.execute_async(Box::new(op), false).expect("queue not disposed");
    }

    let disposed = recv_queue.dispose();
    t.check("dispose() returns true the first time", disposed, "");
    t.check("dispose() is idempotent", !recv_queue.dispose(), "second call should return false");

    let seen = flags.lock().unwrap().clone();
    t.check(
        "both queued ops completed as cancelled",
        seen.len() == 2 && seen.iter().all(|f| *f == CompletionFlags::CompletedCanceled),
        &format!("{seen:?}"),
    );

    unsafe {
        libc::close(a);
        libc::close(b);
    }
}

fn main() {
    println!("=== Loopback Smoke Test ===");

    let mut t = TestRunner::new();
    let Some(mut exec) = test_construction(&mut t) else {
        t.summary();
        std::process::exit(1);
    };

    test_single_round_trip(&mut t, &mut exec);
    test_send_round_trip(&mut t, &mut exec);
    test_fifo_ordering(&mut t, &mut exec);
    test_dispose_cancels_queued(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
