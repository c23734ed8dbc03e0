//! Immutable read tasks and the queue(s) they flow through (spec §3 "Task",
//! "TaskQueue", C1, C2).
//!
//! Grounded on the teacher's `session_mt::MtState`/`MtStateInner`: a
//! mutex-protected shared structure plus a condvar-signalled producer/
//! consumer handoff. The spec's intrusive singly-linked list with a
//! `need_mutex` parameter threaded through push/pop is a C-specific
//! optimization (avoid re-entering the lock when the caller already
//! holds it); the same distinction is expressed here as two concrete
//! types instead of a boolean flag — [`TaskQueue`] for pool mode (always
//! mutex-protected, shared across worker threads) and [`SerialQueue`] for
//! serial mode (never shared, so never locked) — unified behind the
//! [`TaskSink`] trait so [`crate::selection::SelectionEngine`] doesn't
//! need to know which mode it's emitting into.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex};

use crate::file_handle::FileHandle;

/// A non-owning view into the caller's output buffer. Per spec §8
/// invariant 2, the selection engine guarantees the `[ptr, ptr+len)`
/// intervals of all tasks in one request are pairwise disjoint, so
/// handing one interval to each worker is race-free even though the
/// underlying allocation is shared.
#[derive(Debug)]
pub(crate) struct TaskBuffer {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: disjointness across tasks in a request is a selection-engine
// invariant (spec §8 invariant 2); each `TaskBuffer` is consumed by
// exactly one worker for the duration of one positional read.
unsafe impl Send for TaskBuffer {}

impl TaskBuffer {
    /// # Safety
    /// `ptr` must be valid for writes of `len` bytes for the duration of
    /// the task's execution, and the caller must uphold the disjointness
    /// invariant across all tasks sharing the same destination buffer.
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: validity and disjointness are established at construction.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One positional read (spec §3 "Task", C1). Immutable after creation.
pub struct Task {
    pub file: Arc<FileHandle>,
    pub file_addr: u64,
    pub dst: TaskBuffer,
}

impl Task {
    /// # Safety
    /// See [`TaskBuffer::new`].
    pub unsafe fn new(file: Arc<FileHandle>, file_addr: u64, dst_ptr: *mut u8, len: usize) -> Self {
        Self {
            file,
            file_addr,
            dst: unsafe { TaskBuffer::new(dst_ptr, len) },
        }
    }

    pub fn length(&self) -> usize {
        self.dst.len()
    }

    pub fn fd(&self) -> RawFd {
        self.file.raw_fd()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("file", &self.file.name())
            .field("file_addr", &self.file_addr)
            .field("length", &self.dst.len())
            .finish()
    }
}

/// Where a [`Task`] goes once built: the global pooled queue, or a
/// request-local serial queue. `push_batch` is the only entry point
/// tasks are produced through — the selection engine calls it in
/// `n_steps`-sized chunks (spec §4.3: "Producer batches pushes and
/// issues `pthread_cond_broadcast(work_available)` every S pushes").
pub trait TaskSink {
    fn push_batch(&self, tasks: Vec<Task>);
}

/// Context for a worker's positional-read failure, carried until the
/// dispatcher drains the queue and surfaces it (spec §4.6: "worker
/// continues to drain so counter invariants hold, dispatcher surfaces
/// failure after drain").
pub struct QueuedIoFailure {
    pub file: String,
    pub offset: u64,
    pub length: usize,
    pub source: io::Error,
}

struct QueueState {
    tasks: VecDeque<Task>,
    unfinished: usize,
    all_enqueued: bool,
    shutdown: bool,
    /// First worker I/O failure observed since the last time it was
    /// taken, if any. Only the first is kept — later ones are logged by
    /// the worker and otherwise dropped, matching `log::error!`'s own
    /// behavior for failures beyond the first.
    first_error: Option<QueuedIoFailure>,
}

/// The shared, mutex-protected queue used in pool mode (C2, global
/// instantiation).
pub struct TaskQueue {
    state: Mutex<QueueState>,
    /// Signalled when the queue transitions from empty to non-empty, or
    /// on shutdown (spec §5: "work_available (queue non-empty or
    /// shutdown)").
    work_available: Condvar,
    /// Signalled when `unfinished` reaches zero (spec §5: "reads_finished
    /// (queue's unfinished reached zero)").
    reads_finished: Condvar,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                unfinished: 0,
                all_enqueued: true,
                shutdown: false,
                first_error: None,
            }),
            work_available: Condvar::new(),
            reads_finished: Condvar::new(),
        }
    }

    /// Clear the `all_enqueued` sentinel for a new request (spec §4.1
    /// step 1); per-request, not cumulative (SPEC_FULL §2).
    pub fn begin_request(&self) {
        let mut s = self.state.lock().unwrap();
        s.all_enqueued = false;
        s.first_error = None;
    }

    /// Record a worker's positional-read failure, keeping only the first
    /// one per request.
    pub fn record_error(&self, failure: QueuedIoFailure) {
        let mut s = self.state.lock().unwrap();
        if s.first_error.is_none() {
            s.first_error = Some(failure);
        }
    }

    /// Take the first recorded failure, if any, clearing it.
    pub fn take_first_error(&self) -> Option<QueuedIoFailure> {
        self.state.lock().unwrap().first_error.take()
    }

    /// Mark that the current request has finished enqueueing tasks (spec
    /// §4.1: "the dispatcher sets `all_enqueued = true`, broadcasts the
    /// 'work available' condition").
    pub fn finish_enqueue(&self) {
        let mut s = self.state.lock().unwrap();
        s.all_enqueued = true;
        self.work_available.notify_all();
    }

    /// Pop up to `max` tasks in one critical section (spec §4.3 step 3).
    /// Blocks while the queue is empty and neither `all_enqueued` nor
    /// `shutdown` is set. Returns an empty vec only when woken by
    /// shutdown with nothing left to do.
    pub fn pop_batch(&self, max: usize) -> Vec<Task> {
        let mut s = self.state.lock().unwrap();
        loop {
            if !s.tasks.is_empty() || s.shutdown {
                break;
            }
            s = self.work_available.wait(s).unwrap();
        }
        let n = max.min(s.tasks.len());
        s.tasks.drain(..n).collect()
    }

    /// Record that `n` tasks have completed (spec §4.3 step 5-6).
    pub fn mark_done(&self, n: usize) {
        let mut s = self.state.lock().unwrap();
        assert!(s.unfinished >= n, "mark_done overcounted");
        s.unfinished -= n;
        if s.unfinished == 0 {
            self.reads_finished.notify_all();
        }
    }

    /// Block until `unfinished` reaches zero (spec §4.1: the dispatcher
    /// "waits on a 'reads finished' condition until `unfinished_tasks =
    /// 0`").
    pub fn wait_drained(&self) {
        let mut s = self.state.lock().unwrap();
        while s.unfinished > 0 {
            s = self.reads_finished.wait(s).unwrap();
        }
    }

    pub fn unfinished(&self) -> usize {
        self.state.lock().unwrap().unfinished
    }

    pub fn in_queue(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    /// Process-terminate shutdown (spec §4.3 "Shutdown"): sets
    /// `shutdown`, forces `all_enqueued`, drops pending tasks, and wakes
    /// every worker blocked on `work_available`.
    pub fn shutdown(&self) {
        let mut s = self.state.lock().unwrap();
        s.shutdown = true;
        s.all_enqueued = true;
        s.tasks.clear();
        self.work_available.notify_all();
    }
}

impl TaskSink for Arc<TaskQueue> {
    fn push_batch(&self, tasks: Vec<Task>) {
        if tasks.is_empty() {
            return;
        }
        let mut s = self.state.lock().unwrap();
        s.unfinished += tasks.len();
        s.tasks.extend(tasks);
        self.work_available.notify_all();
    }
}

/// A request-local, unshared queue used in serial mode (C2, per-request
/// stack-local instantiation): no locking, drained on the calling
/// thread.
#[derive(Default)]
pub struct SerialQueue {
    tasks: VecDeque<Task>,
}

impl SerialQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskSink for std::cell::RefCell<SerialQueue> {
    fn push_batch(&self, tasks: Vec<Task>) {
        self.borrow_mut().tasks.extend(tasks);
    }
}
