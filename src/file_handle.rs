//! Process-local raw file descriptor, reference-counted by the children
//! that bind to it, with cooperative close (spec §3 "FileHandle
//! lifecycle", §4.5).
//!
//! Grounded on the teacher's `io_ops::FileDescriptorRawHandle` (a raw fd
//! wrapped with a guarded, idempotent close) and `session_mt::MtState`
//! (mutex + condvar coordination between a producer and consumers). Per
//! the spec's own §9 design note, a `FileHandle` is shared-owned by the
//! set {library file object, each child shadow, each in-flight task}; we
//! express that directly as `Arc<FileHandle>` rather than a hand-rolled
//! refcount, and in-flight [`crate::task::Task`]s hold a clone of that
//! `Arc` so the counter discipline (`num_reads`) is what gates *closing*,
//! while ownership (and therefore liveness of the fd) is what Rust's
//! own `Arc` already guarantees.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{BypassError, Result};

struct Inner {
    num_reads: usize,
    read_started: bool,
    closed: bool,
}

/// A process-local raw file descriptor opened purely for positional
/// reads, independent of whatever handle the underlying engine already
/// holds for the same file (spec §9 open question 1: the raw descriptor
/// is opened unconditionally on every file open, including writes, and
/// used only by the bypass read path).
pub struct FileHandle {
    fd: RawFd,
    name: String,
    inner: Mutex<Inner>,
    close_ready: Condvar,
}

// SAFETY: the raw fd is only ever used for positional (pread) reads,
// which the kernel serializes internally; no seek cursor is shared.
unsafe impl Send for FileHandle {}
unsafe impl Sync for FileHandle {}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("fd", &self.fd)
            .field("num_reads", &inner.num_reads)
            .field("read_started", &inner.read_started)
            .field("closed", &inner.closed)
            .finish()
    }
}

impl FileHandle {
    /// Open a raw read-only descriptor on `path` for positional reads.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Arc<Self>> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let c_path = std::ffi::CString::new(name.as_bytes()).map_err(|e| {
            BypassError::Lifecycle {
                file: name.clone(),
                reason: format!("path contains a NUL byte: {e}"),
            }
        })?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return Err(BypassError::Io {
                file: name,
                offset: 0,
                length: 0,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Arc::new(Self {
            fd,
            name,
            inner: Mutex::new(Inner {
                num_reads: 0,
                read_started: false,
                closed: false,
            }),
            close_ready: Condvar::new(),
        }))
    }

    /// Wrap an already-open raw descriptor (used by tests and by callers
    /// that want to reuse a descriptor the host engine already opened).
    pub fn from_raw_fd(fd: RawFd, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            fd,
            name: name.into(),
            inner: Mutex::new(Inner {
                num_reads: 0,
                read_started: false,
                closed: false,
            }),
            close_ready: Condvar::new(),
        })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Called by a worker immediately before it issues the positional
    /// read for a task bound to this file (spec §4.3 step 3): increments
    /// `num_reads` and transitions `Active -> Reading` on the first call.
    pub(crate) fn begin_read(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.num_reads += 1;
        inner.read_started = true;
    }

    /// Called by a worker after the positional read for a task completes,
    /// success or failure (spec §4.3 step 5, §4.6: failures still reach
    /// this call so counter discipline holds). When the file reaches
    /// quiescence (`num_reads` back to zero), signals any waiter blocked
    /// in [`FileHandle::close`].
    pub(crate) fn end_read(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(inner.num_reads > 0, "end_read without matching begin_read");
        inner.num_reads -= 1;
        if inner.num_reads == 0 {
            inner.read_started = false;
            self.close_ready.notify_all();
        }
    }

    pub fn num_reads(&self) -> usize {
        self.inner.lock().unwrap().num_reads
    }

    pub fn is_reading(&self) -> bool {
        self.inner.lock().unwrap().read_started
    }

    /// Cooperative close (spec §4.5): blocks while `read_started ∧
    /// num_reads > 0`, waiting on the close-readiness condition, then
    /// closes the raw descriptor. Idempotent: a second call is a no-op.
    ///
    /// This is a state transition requested by whichever owner believes
    /// its reference is the last one, not `Drop` — the handle may still
    /// be kept alive afterward by other `Arc` owners (in which case the
    /// fd is simply closed while the `FileHandle` value lingers); the
    /// real cleanup-on-drop is a cheap best-effort fallback, see
    /// `Drop for FileHandle`.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        while inner.read_started && inner.num_reads > 0 {
            inner = self.close_ready.wait(inner).unwrap();
        }
        if inner.closed {
            return Ok(());
        }
        let rc = unsafe { libc::close(self.fd) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return Err(BypassError::Lifecycle {
                file: self.name.clone(),
                reason: format!("close(2) failed: {err}"),
            });
        }
        inner.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        // Best-effort: if an explicit close() already ran, this is a
        // no-op. If not, and reads somehow are still outstanding (which
        // should not happen given the Arc-based ownership discipline —
        // a Task holds a strong ref for the lifetime of its read), we
        // must not block inside Drop, so we close unconditionally and
        // rely on the counter-discipline invariant being upheld
        // elsewhere (spec §8 invariant 4).
        if let Ok(inner) = self.inner.get_mut() {
            if !inner.closed {
                unsafe {
                    libc::close(self.fd);
                }
                inner.closed = true;
            }
        }
    }
}
