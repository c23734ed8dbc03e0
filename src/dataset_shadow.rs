//! Cached per-dataset metadata and the bypass/fall-back latch (spec §3
//! "DatasetShadow invariants", C4).
//!
//! Grounded on the teacher's `Session<FS>`, which binds cached,
//! request-scoped state (protocol version, init/destroy flags) to the
//! lifetime of one mounted filesystem. Here the cached state is per
//! dataset and its lifetime is bound to the owning [`FileHandle`] via a
//! strong `Arc` reference, per spec: "the shadow's lifetime is a strict
//! subinterval of its FileHandle's lifetime."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::file_handle::FileHandle;
use crate::types::{ElementType, Layout, StorageStatus};

/// Cached metadata for one open dataset (C4). Built once when a dataset
/// is opened/created and rebuilt only when a set-extent is observed.
///
/// `Space` is the host engine's dataspace handle type
/// ([`crate::host::HostEngine::Space`]).
pub struct DatasetShadow<Space> {
    /// Back-reference to the owning file; holds a strong count so the
    /// file outlives the shadow.
    pub file: Arc<FileHandle>,
    pub name: String,
    pub element_type: ElementType,
    pub layout: Layout,
    pub space: Space,
    pub filter_count: usize,
    pub chunk_dims: Option<Vec<u64>>,
    pub storage_status: StorageStatus,
    pub external_file_count: usize,
    pub base_addr: Option<u64>,
    /// Whether `use_native` has been decided. Once true, `use_native` is
    /// immutable until the shadow is dropped (spec invariant).
    use_native_checked: AtomicBool,
    use_native: AtomicBool,
}

impl<Space> DatasetShadow<Space> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file: Arc<FileHandle>,
        name: impl Into<String>,
        element_type: ElementType,
        layout: Layout,
        space: Space,
        filter_count: usize,
        chunk_dims: Option<Vec<u64>>,
        storage_status: StorageStatus,
        external_file_count: usize,
        base_addr: Option<u64>,
    ) -> Self {
        Self {
            file,
            name: name.into(),
            element_type,
            layout,
            space,
            filter_count,
            chunk_dims,
            storage_status,
            external_file_count,
            base_addr,
            use_native_checked: AtomicBool::new(false),
            use_native: AtomicBool::new(false),
        }
    }

    /// Returns the current fall-back decision if one has already been
    /// latched, otherwise `None`.
    pub fn use_native(&self) -> Option<bool> {
        if self.use_native_checked.load(Ordering::Acquire) {
            Some(self.use_native.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Latch the fall-back decision. Once set, further calls are no-ops:
    /// the decision is immutable until the shadow is dropped.
    pub fn latch_use_native(&self, decision: bool) {
        if self
            .use_native_checked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.use_native.store(decision, Ordering::Release);
        }
    }

    /// Invalidate the cached space and the latched decision after a
    /// set-extent operation (spec: "space is the current file-space; it
    /// is invalidated and rebuilt whenever a set-extent operation is
    /// observed").
    pub fn invalidate_on_set_extent(&mut self, new_space: Space) {
        self.space = new_space;
        self.use_native_checked.store(false, Ordering::Release);
        self.use_native.store(false, Ordering::Release);
    }

    pub fn is_bypassable_by_layout(&self) -> bool {
        self.layout.is_bypassable()
    }
}
