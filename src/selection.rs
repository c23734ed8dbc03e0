//! Selection decomposition engine (spec §4.2, C5).
//!
//! Converts a (file-space, mem-space) pair into an ordered stream of
//! `(file-offset, memory-offset, length)` byte-copy tasks, for both the
//! contiguous and chunked layouts. The set algebra (intersect, project,
//! shift, sequence-list iteration) is delegated to
//! [`crate::host::HostEngine`] per the real library's own dataspace
//! routines; this module only orchestrates the order of calls and the
//! lockstep walk across the two iterators, which is the actual hard part
//! (spec §2: "25% of the budget").
//!
//! Grounded on `other_examples/0de479e9_fjall-rs-lsm-tree__src-table-mod.rs.rs`'s
//! batched sequential-scan iterator shape (pull a bounded batch, consume
//! it, refill), adapted here to two iterators walked in lockstep instead
//! of one.

use smallvec::SmallVec;

use crate::error::{BypassError, Result};
use crate::file_handle::FileHandle;
use crate::host::{HostEngine, HyperslabOp, SequenceIterator};
use crate::logger::{LogRecord, Logger};
use crate::task::{Task, TaskSink};
use crate::types::SelectionKind;
use std::sync::Arc;

/// How many `(offset, length)` sequence descriptors are pulled from a
/// selection iterator per batch (spec §4.2: "K is an implementation
/// constant, e.g. 128").
const SEQ_BATCH: usize = 128;

type Batch = SmallVec<[(u64, u64); SEQ_BATCH]>;

/// Pulls `SEQ_BATCH`-sized batches from a [`SequenceIterator`] and lets
/// the caller consume a prefix of the front entry without reallocating.
struct BatchCursor<'a> {
    iter: Box<dyn SequenceIterator + 'a>,
    batch: Batch,
    pos: usize,
}

impl<'a> BatchCursor<'a> {
    fn new(iter: Box<dyn SequenceIterator + 'a>) -> Self {
        Self {
            iter,
            batch: SmallVec::new(),
            pos: 0,
        }
    }

    /// Ensure there's a current entry available, refilling if needed.
    /// Returns `None` once the underlying selection is exhausted.
    fn peek(&mut self) -> Option<(u64, u64)> {
        if self.pos >= self.batch.len() {
            self.batch = self.iter.next_batch(SEQ_BATCH).into_iter().collect();
            self.pos = 0;
            if self.batch.is_empty() {
                return None;
            }
        }
        Some(self.batch[self.pos])
    }

    /// Consume `n` bytes from the front entry (caller guarantees `n <=`
    /// that entry's length); advances past it entirely if exhausted.
    fn consume(&mut self, n: u64) {
        let (off, len) = self.batch[self.pos];
        if n == len {
            self.pos += 1;
        } else {
            self.batch[self.pos] = (off + n, len - n);
        }
    }
}

/// Converts selections into [`Task`]s (C5).
pub struct SelectionEngine {
    /// Upper bound on elements per emitted task (`BYPASS_VOL_MAX_NELMTS`).
    pub max_elements_per_task: usize,
    /// Minimum per-worker batch pull, reused here as the producer's
    /// push-batch size (spec §4.3: "Producer batches pushes ... every S
    /// pushes").
    pub n_steps: usize,
}

/// Running totals used to check spec §8 invariant 1 (file-side and
/// memory-side totals match the selected point count times element
/// size).
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompositionTotals {
    pub file_bytes: u64,
    pub mem_bytes: u64,
    pub tasks_emitted: usize,
}

impl SelectionEngine {
    pub fn new(max_elements_per_task: usize, n_steps: usize) -> Self {
        Self {
            max_elements_per_task: max_elements_per_task.max(1),
            n_steps: n_steps.max(1),
        }
    }

    /// Contiguous path (spec §4.2 "Contiguous path"). Also appends one
    /// [`LogRecord`] per emitted task (spec §4.4: "each emitted task
    /// appends one non-boundary record") — `base_addr` doubles as the
    /// record's `dataset_base_addr` field, so for the chunked path's
    /// per-chunk calls that field is the chunk's address rather than the
    /// dataset's contiguous address (SPEC_FULL §2 open-question
    /// resolution: there is no single dataset-wide base address once a
    /// dataset is chunked, so the base actually used to compute the
    /// task's file address is what gets logged).
    #[allow(clippy::too_many_arguments)]
    pub fn build_contiguous<H: HostEngine>(
        &self,
        host: &H,
        file_space: &H::Space,
        mem_space: &H::Space,
        base_addr: u64,
        elem_size: usize,
        file: &Arc<FileHandle>,
        dst_base: *mut u8,
        sink: &impl TaskSink,
        logger: &Logger,
        dataset_name: &str,
    ) -> Result<DecompositionTotals> {
        let max_task_bytes = (self.max_elements_per_task as u64) * (elem_size as u64).max(1);
        let mut file_cur = BatchCursor::new(host.sequence_iter(file_space, elem_size));
        let mut mem_cur = BatchCursor::new(host.sequence_iter(mem_space, elem_size));

        let mut totals = DecompositionTotals::default();
        let mut pending: Vec<Task> = Vec::with_capacity(self.n_steps);

        loop {
            let file_entry = file_cur.peek();
            let mem_entry = mem_cur.peek();
            match (file_entry, mem_entry) {
                (None, None) => break,
                (None, Some(_)) | (Some(_), None) => {
                    return Err(BypassError::Selection(
                        "file and memory selections produced different point counts".into(),
                    ));
                }
                (Some((foff, flen)), Some((moff, mlen))) => {
                    let io_len = flen.min(mlen).min(max_task_bytes.max(1));
                    debug_assert!(io_len > 0);

                    // SAFETY: the selection engine's own contract (spec §8
                    // invariant 2) guarantees mem intervals across all
                    // tasks of one request are disjoint; `dst_base` is
                    // valid for the full memory selection's byte range.
                    let task = unsafe {
                        Task::new(
                            Arc::clone(file),
                            base_addr + foff,
                            dst_base.add(moff as usize),
                            io_len as usize,
                        )
                    };
                    logger.append_record(LogRecord {
                        file_name: file.name().to_string(),
                        dataset_name: dataset_name.to_string(),
                        base_addr,
                        file_elem_offset: foff / elem_size as u64,
                        elem_count: io_len / elem_size as u64,
                        mem_elem_offset: moff / elem_size as u64,
                    });

                    pending.push(task);
                    totals.file_bytes += io_len;
                    totals.mem_bytes += io_len;
                    totals.tasks_emitted += 1;

                    file_cur.consume(io_len);
                    mem_cur.consume(io_len);

                    if pending.len() >= self.n_steps {
                        sink.push_batch(std::mem::take(&mut pending));
                    }
                }
            }
        }
        if !pending.is_empty() {
            sink.push_batch(pending);
        }
        Ok(totals)
    }

    /// Chunked path (spec §4.2 "Chunked path").
    #[allow(clippy::too_many_arguments)]
    pub fn build_chunked<H: HostEngine>(
        &self,
        host: &H,
        dataset: &str,
        orig_file_space: &H::Space,
        mem_space: &H::Space,
        chunk_dims: &[u64],
        elem_size: usize,
        file: &Arc<FileHandle>,
        dst_base: *mut u8,
        sink: &impl TaskSink,
        logger: &Logger,
    ) -> Result<DecompositionTotals> {
        let chunks = host
            .chunk_iter(dataset)
            .map_err(|e| BypassError::Selection(format!("chunk iteration failed: {e}")))?;
        let ndim = chunk_dims.len();
        let ones = vec![1u64; ndim];

        let mut totals = DecompositionTotals::default();

        for chunk in chunks {
            // Step 1: reset a working copy of the file-space to the
            // dataset's full extent with its original selection.
            let mut working = host.space_copy(orig_file_space);

            // Step 2: if not already a hyperslab, replace with the
            // all-hyperslab of the dataset.
            if host.select_type(&working) != SelectionKind::Hyperslab {
                let dims = host.space_extent_dims(&working);
                let start = vec![0u64; dims.len()];
                let stride = vec![1u64; dims.len()];
                let block = vec![1u64; dims.len()];
                working =
                    host.select_hyperslab(&working, HyperslabOp::Set, &start, &stride, &dims, &block);
            }

            // Step 3: intersect with the chunk's bounding hyperslab.
            working = host.select_hyperslab(
                &working,
                HyperslabOp::And,
                &chunk.offset,
                &ones,
                chunk_dims,
                &ones,
            );

            // Step 4: skip empty intersections.
            if host.select_npoints(&working) == 0 {
                continue;
            }

            // Step 5: project the memory selection through the
            // intersection.
            let projected_mem = host.select_project_intersection(orig_file_space, &working, mem_space)?;

            // Step 6: shift so the chunk's offset becomes the origin,
            // then shrink the extent to the chunk's dimensions.
            let signed_offset: Vec<i64> = chunk.offset.iter().map(|&o| o as i64).collect();
            let shifted = host.select_adjust(&working, &signed_offset);
            let shrunk = host.space_set_extent(&shifted, chunk_dims);

            // Step 7: invoke the contiguous path with base_addr =
            // chunk_addr.
            let chunk_totals = self.build_contiguous(
                host,
                &shrunk,
                &projected_mem,
                chunk.addr,
                elem_size,
                file,
                dst_base,
                sink,
                logger,
                dataset,
            )?;
            totals.file_bytes += chunk_totals.file_bytes;
            totals.mem_bytes += chunk_totals.mem_bytes;
            totals.tasks_emitted += chunk_totals.tasks_emitted;
            // Step 8: the projected mem-space and shifted/shrunk
            // file-space are scoped to this loop iteration and dropped
            // here; `working`/the dataset-extent copy is rebuilt fresh
            // next iteration rather than reused, since the host's space
            // type has value semantics in this crate (no explicit
            // release call needed, unlike the C original's explicit
            // `H5Sclose`).
        }

        Ok(totals)
    }
}
