//! Error taxonomy (spec §7).
//!
//! Each variant corresponds to one of §7's error kinds and carries enough
//! context to log and to decide fall-back vs. propagate. Propagation
//! policy is documented on each variant, not enforced by the type itself
//! (that's [`crate::dispatcher`]'s job); the type only needs to be
//! distinguishable at the call site.

use thiserror::Error;

/// Errors raised while servicing a bypassable read, or while deciding
/// whether a request is bypassable at all.
#[derive(Debug, Error)]
pub enum BypassError {
    /// A metadata query on the dataset failed during classification
    /// (spec §4.1). Recovery policy: local — the caller falls back to the
    /// underlying engine for that dataset tuple; this is never surfaced
    /// to the top-level caller as a failure.
    #[error("classification query failed for dataset {dataset}: {reason}")]
    Classification { dataset: String, reason: String },

    /// A selection iterator or a selection-projection call failed (spec
    /// §4.2, §4.6). Recovery policy: fatal for the request — the queue is
    /// drained, FileHandle counters are restored, and failure is
    /// returned to the caller. The file flush (which already happened)
    /// is not undone.
    #[error("selection decomposition failed: {0}")]
    Selection(String),

    /// A positional read returned short, hit EOF, or failed with a
    /// non-retryable errno (spec §4.3, §4.6). Recovery policy:
    /// queue-drain-then-propagate — the worker keeps draining so counter
    /// invariants hold and the file can still close, and the dispatcher
    /// surfaces failure only after the drain completes.
    #[error("positional read of {length} bytes at offset {offset} on {file} failed: {source}")]
    Io {
        file: String,
        offset: u64,
        length: usize,
        #[source]
        source: std::io::Error,
    },

    /// A FileHandle reference count underflowed, or close was attempted
    /// on an already-closed handle (spec §4.5, §4.6). Recovery policy:
    /// fatal, always logged, never swallowed.
    #[error("lifecycle violation on file handle {file}: {reason}")]
    Lifecycle { file: String, reason: String },

    /// The connector's configuration string was malformed, or the
    /// underlying-engine info it should carry was missing (spec §6, §7).
    /// Recovery policy: immediate propagation; open/create fails and no
    /// resources are allocated.
    #[error("invalid bypass-vol configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BypassError>;

impl BypassError {
    /// True for error kinds whose policy is "don't abort the whole
    /// request, recover locally" (spec §7's classification row).
    pub fn is_recoverable_by_fallback(&self) -> bool {
        matches!(self, BypassError::Classification { .. })
    }
}
