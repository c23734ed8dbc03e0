//! Top-level read entry point: the fall-back decision machine plus
//! per-request orchestration (spec §4.1, C7).
//!
//! Grounded on the teacher's `Session::dispatch`, which sits at the same
//! seam: one entry point per incoming request, a classification step,
//! then either a fast path or a forward to the underlying handler. The
//! pool/serial split is grounded on `Session` vs `MtSession` — two
//! concrete runtimes behind the same request-handling surface, selected
//! once at startup rather than per call.

use std::sync::Arc;

use crate::dataset_shadow::DatasetShadow;
use crate::error::{BypassError, Result};
use crate::host::HostEngine;
use crate::logger::Logger;
use crate::selection::SelectionEngine;
use crate::task::{SerialQueue, TaskQueue};
use crate::types::{Class, Layout, Sign, StorageStatus};

/// One dataset-read tuple as received from the host-engine contract
/// (spec §4.1: "an array of (dataset, mem-type, mem-space, file-space,
/// destination buffer) tuples").
pub struct ReadTuple<Space> {
    pub mem_type: String,
    pub mem_space: Space,
    /// File-space selection for this call. `None` uses the dataset
    /// shadow's cached selection (spec §4.2: "the dataset's file-space
    /// (or the caller's override)") — most calls read the whole dataset
    /// or whatever hyperslab was last selected on it, but nothing stops
    /// two calls against the same attached dataset from each carrying a
    /// different file-space hyperslab, the normal `H5Dread` usage
    /// pattern.
    pub file_space: Option<Space>,
    pub dst_ptr: *mut u8,
    pub dst_len: usize,
}

/// What happened to one tuple (spec §8 invariant 6: fall-back tuples must
/// still invoke the underlying engine exactly once — that invocation is
/// the caller's responsibility, signalled by this outcome).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Serviced by the bypass path; `tasks` positional reads were issued.
    Bypassed { tasks: usize },
    /// Classification triggered a fall-back rule; caller must forward
    /// the tuple to the underlying engine.
    FallBack,
    /// Either selection was "none"; a silent no-op (spec §8 invariant 5).
    Noop,
}

/// Where tasks actually run once built (spec §4.1 "serial mode").
pub enum Runtime {
    Pool(Arc<TaskQueue>),
    Serial,
}

/// The decision machine plus orchestration (C7).
pub struct ReadDispatcher {
    selection: SelectionEngine,
    logger: Arc<Logger>,
    runtime: Runtime,
}

impl ReadDispatcher {
    pub fn new(max_elements_per_task: usize, n_steps: usize, logger: Arc<Logger>, runtime: Runtime) -> Self {
        Self {
            selection: SelectionEngine::new(max_elements_per_task, n_steps),
            logger,
            runtime,
        }
    }

    /// Run the 8-step decision machine (spec §4.1). Returns the binding
    /// `use_native` decision, latching it on the shadow on first call.
    fn classify<H: HostEngine>(&self, host: &H, shadow: &DatasetShadow<H::Space>, mem_type: &str) -> Result<bool> {
        if let Some(decision) = shadow.use_native() {
            return Ok(decision);
        }

        let reason: Option<&'static str> = if shadow.filter_count > 0 {
            Some("filter count > 0")
        } else if matches!(shadow.layout, Layout::Virtual | Layout::Compact) {
            Some("layout is virtual or compact")
        } else if shadow.element_type.class != Class::Integer {
            Some("element class is not integer")
        } else if shadow.element_type.size != host.native_int_size() {
            Some("element size does not match the platform's native int size")
        } else if shadow.element_type.sign != Sign::TwosComplement {
            Some("sign is not two's-complement")
        } else if shadow.external_file_count > 0 {
            Some("external file count > 0")
        } else {
            None
        };

        let reason = match reason {
            Some(r) => Some(r),
            None => {
                let mem_elem_type = host.dataset_mem_type_for_request(&shadow.name, mem_type)?;
                if mem_elem_type != shadow.element_type {
                    Some("memory type differs from file type")
                } else if shadow.storage_status != StorageStatus::Allocated {
                    Some("storage is not allocated")
                } else {
                    None
                }
            }
        };

        let use_native = reason.is_some();
        if let Some(reason) = reason {
            log::debug!("dataset {} falls back to the underlying engine: {reason}", shadow.name);
        }
        shadow.latch_use_native(use_native);
        Ok(use_native)
    }

    /// Service one read tuple. Non-bypassable or no-op tuples are
    /// reported via [`DispatchOutcome`] without touching the task
    /// pipeline; the caller is responsible for forwarding fall-back
    /// tuples to the underlying engine.
    pub fn dispatch_read<H: HostEngine>(
        &self,
        host: &H,
        shadow: &DatasetShadow<H::Space>,
        tuple: ReadTuple<H::Space>,
    ) -> Result<DispatchOutcome> {
        let file_space: &H::Space = tuple.file_space.as_ref().unwrap_or(&shadow.space);

        if host.select_type(&tuple.mem_space).is_noop() || host.select_type(file_space).is_noop() {
            return Ok(DispatchOutcome::Noop);
        }
        if !host.select_type(&tuple.mem_space).is_bypassable() || !host.select_type(file_space).is_bypassable() {
            return Ok(DispatchOutcome::FallBack);
        }

        if self.classify(host, shadow, &tuple.mem_type)? {
            return Ok(DispatchOutcome::FallBack);
        }

        host.flush_file(shadow.file.name()).map_err(|source| BypassError::Io {
            file: shadow.file.name().to_string(),
            offset: 0,
            length: 0,
            source,
        })?;

        let elem_size = shadow.element_type.size;
        let tasks = match &self.runtime {
            Runtime::Pool(queue) => {
                queue.begin_request();
                let totals = self.build(host, shadow, file_space, &tuple, queue, elem_size)?;
                queue.finish_enqueue();
                queue.wait_drained();
                self.logger.append_boundary();
                if let Some(failure) = queue.take_first_error() {
                    return Err(BypassError::Io {
                        file: failure.file,
                        offset: failure.offset,
                        length: failure.length,
                        source: failure.source,
                    });
                }
                totals
            }
            Runtime::Serial => {
                let local = std::cell::RefCell::new(SerialQueue::new());
                let totals = self.build(host, shadow, file_space, &tuple, &local, elem_size)?;
                let tasks = local.into_inner().drain();
                let mut first_error: Option<BypassError> = None;
                for mut task in tasks {
                    task.file.begin_read();
                    let fd = task.fd();
                    let offset = task.file_addr;
                    let result = {
                        let buf = task.dst.as_mut_slice();
                        crate::pool::pread_full(fd, buf, offset)
                    };
                    if let Err(err) = result {
                        if first_error.is_none() {
                            first_error = Some(BypassError::Io {
                                file: task.file.name().to_string(),
                                offset,
                                length: task.length(),
                                source: err,
                            });
                        }
                    }
                    task.file.end_read();
                }
                if let Some(err) = first_error {
                    return Err(err);
                }
                totals
            }
        };

        Ok(DispatchOutcome::Bypassed {
            tasks: tasks.tasks_emitted,
        })
    }

    fn build<H: HostEngine>(
        &self,
        host: &H,
        shadow: &DatasetShadow<H::Space>,
        file_space: &H::Space,
        tuple: &ReadTuple<H::Space>,
        sink: &impl crate::task::TaskSink,
        elem_size: usize,
    ) -> Result<crate::selection::DecompositionTotals> {
        match shadow.layout {
            Layout::Contiguous => {
                let base_addr = shadow.base_addr.ok_or_else(|| {
                    BypassError::Selection(format!(
                        "dataset {} is contiguous but has no storage address",
                        shadow.name
                    ))
                })?;
                self.selection.build_contiguous(
                    host,
                    file_space,
                    &tuple.mem_space,
                    base_addr,
                    elem_size,
                    &shadow.file,
                    tuple.dst_ptr,
                    sink,
                    &self.logger,
                    &shadow.name,
                )
            }
            Layout::Chunked => {
                let chunk_dims = shadow.chunk_dims.clone().ok_or_else(|| {
                    BypassError::Selection(format!("dataset {} is chunked but reports no chunk dims", shadow.name))
                })?;
                self.selection.build_chunked(
                    host,
                    &shadow.name,
                    file_space,
                    &tuple.mem_space,
                    &chunk_dims,
                    elem_size,
                    &shadow.file,
                    tuple.dst_ptr,
                    sink,
                    &self.logger,
                )
            }
            _ => unreachable!("classify() falls back before reaching build() for non-bypassable layouts"),
        }
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }
}
