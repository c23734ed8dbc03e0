//! Host-engine fixture for integration tests, backed by real temp files
//! and real `pread` through [`bypass_vol::FileHandle`] — integration
//! tests can't reach `pub(crate)` test fixtures, so this is a second,
//! independent implementation of the same contract.

use std::collections::HashMap;
use std::sync::Mutex;

use bypass_vol::{
    ByteOrder, ChunkInfo, Class, ElementType, HostEngine, HyperslabOp, Layout, Result,
    SelectionKind, SequenceIterator, Sign, StorageStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSpace {
    pub dims: Vec<u64>,
    pub kind: SelectionKind,
    pub points: Vec<u64>,
}

fn strides(dims: &[u64]) -> Vec<u64> {
    let mut s = vec![1u64; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        s[i] = s[i + 1] * dims[i + 1];
    }
    s
}

fn to_linear(dims: &[u64], coords: &[u64]) -> u64 {
    coords.iter().zip(strides(dims).iter()).map(|(c, s)| c * s).sum()
}

fn regular_hyperslab_points(
    dims: &[u64],
    start: &[u64],
    stride: &[u64],
    count: &[u64],
    block: &[u64],
) -> Vec<u64> {
    let ndim = dims.len();
    let mut out = Vec::new();
    if count.iter().any(|&c| c == 0) {
        return out;
    }
    let mut idx = vec![0u64; ndim];
    let mut blk = vec![0u64; ndim];
    loop {
        let coords: Vec<u64> = (0..ndim)
            .map(|d| start[d] + idx[d] * stride[d] + blk[d])
            .collect();
        if coords.iter().zip(dims.iter()).all(|(c, d)| c < d) {
            out.push(to_linear(dims, &coords));
        }
        let mut d = ndim;
        loop {
            if d == 0 {
                return out;
            }
            d -= 1;
            blk[d] += 1;
            if blk[d] < block[d] {
                break;
            }
            blk[d] = 0;
            idx[d] += 1;
            if idx[d] < count[d] {
                break;
            }
            idx[d] = 0;
            if d == 0 {
                return out;
            }
        }
    }
}

pub struct FixtureDataset {
    pub file: String,
    pub element_type: ElementType,
    pub layout: Layout,
    pub dims: Vec<u64>,
    pub chunk_dims: Option<Vec<u64>>,
    pub filter_count: usize,
    pub external_file_count: usize,
    pub storage_status: StorageStatus,
    pub base_addr: Option<u64>,
    pub chunks: Vec<ChunkInfo>,
}

pub struct FixtureEngine {
    pub native_int_size: usize,
    pub datasets: HashMap<String, FixtureDataset>,
    pub native_read_calls: Mutex<usize>,
}

impl FixtureEngine {
    pub fn new(datasets: HashMap<String, FixtureDataset>) -> Self {
        Self {
            native_int_size: 4,
            datasets,
            native_read_calls: Mutex::new(0),
        }
    }

    pub fn all_space(dims: Vec<u64>) -> FixtureSpace {
        let start = vec![0u64; dims.len()];
        let stride = vec![1u64; dims.len()];
        let block = vec![1u64; dims.len()];
        let points = regular_hyperslab_points(&dims, &start, &stride, &dims, &block);
        FixtureSpace {
            dims,
            kind: SelectionKind::All,
            points,
        }
    }

    pub fn hyperslab_space(
        dims: Vec<u64>,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
        block: &[u64],
    ) -> FixtureSpace {
        let points = regular_hyperslab_points(&dims, start, stride, count, block);
        FixtureSpace {
            dims,
            kind: SelectionKind::Hyperslab,
            points,
        }
    }

    fn dataset(&self, name: &str) -> Result<&FixtureDataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| bypass_vol::BypassError::Classification {
                dataset: name.to_string(),
                reason: "unknown dataset".to_string(),
            })
    }
}

pub struct FixtureSeqIter<'a> {
    points: &'a [u64],
    pos: usize,
    elem_size: usize,
}

impl<'a> SequenceIterator for FixtureSeqIter<'a> {
    fn next_batch(&mut self, max: usize) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        while out.len() < max && self.pos < self.points.len() {
            let run_start = self.points[self.pos];
            let mut run_len = 1u64;
            let mut next = self.pos + 1;
            while next < self.points.len() && self.points[next] == run_start + run_len {
                run_len += 1;
                next += 1;
            }
            out.push((
                run_start * self.elem_size as u64,
                run_len * self.elem_size as u64,
            ));
            self.pos = next;
        }
        out
    }
}

impl HostEngine for FixtureEngine {
    type Space = FixtureSpace;

    fn native_int_size(&self) -> usize {
        self.native_int_size
    }

    fn dataset_file_name(&self, dataset: &str) -> Result<String> {
        Ok(self.dataset(dataset)?.file.clone())
    }

    fn dataset_type(&self, dataset: &str) -> Result<ElementType> {
        Ok(self.dataset(dataset)?.element_type)
    }

    fn dataset_mem_type_for_request(&self, dataset: &str, mem_type: &str) -> Result<ElementType> {
        if mem_type == "native" {
            self.dataset_type(dataset)
        } else {
            Ok(ElementType::new(Class::Other, 0, ByteOrder::None, Sign::NotApplicable))
        }
    }

    fn dataset_layout(&self, dataset: &str) -> Result<Layout> {
        Ok(self.dataset(dataset)?.layout)
    }

    fn dataset_space(&self, dataset: &str) -> Result<Self::Space> {
        Ok(FixtureEngine::all_space(self.dataset(dataset)?.dims.clone()))
    }

    fn dataset_filter_count(&self, dataset: &str) -> Result<usize> {
        Ok(self.dataset(dataset)?.filter_count)
    }

    fn dataset_external_file_count(&self, dataset: &str) -> Result<usize> {
        Ok(self.dataset(dataset)?.external_file_count)
    }

    fn dataset_storage_status(&self, dataset: &str) -> Result<StorageStatus> {
        Ok(self.dataset(dataset)?.storage_status)
    }

    fn dataset_contiguous_addr(&self, dataset: &str) -> Result<Option<u64>> {
        Ok(self.dataset(dataset)?.base_addr)
    }

    fn dataset_chunk_dims(&self, dataset: &str) -> Result<Option<Vec<u64>>> {
        Ok(self.dataset(dataset)?.chunk_dims.clone())
    }

    fn chunk_iter(&self, dataset: &str) -> Result<Vec<ChunkInfo>> {
        Ok(self.dataset(dataset)?.chunks.clone())
    }

    fn flush_file(&self, _file: &str) -> std::io::Result<()> {
        Ok(())
    }

    fn space_copy(&self, space: &Self::Space) -> Self::Space {
        space.clone()
    }

    fn space_extent_dims(&self, space: &Self::Space) -> Vec<u64> {
        space.dims.clone()
    }

    fn space_set_extent(&self, space: &Self::Space, dims: &[u64]) -> Self::Space {
        let mut s = space.clone();
        s.dims = dims.to_vec();
        s
    }

    fn select_hyperslab(
        &self,
        space: &Self::Space,
        op: HyperslabOp,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
        block: &[u64],
    ) -> Self::Space {
        let new_points = regular_hyperslab_points(&space.dims, start, stride, count, block);
        match op {
            HyperslabOp::Set => FixtureSpace {
                dims: space.dims.clone(),
                kind: SelectionKind::Hyperslab,
                points: new_points,
            },
            HyperslabOp::And => {
                let set: std::collections::HashSet<u64> = new_points.into_iter().collect();
                FixtureSpace {
                    dims: space.dims.clone(),
                    kind: SelectionKind::Hyperslab,
                    points: space.points.iter().copied().filter(|p| set.contains(p)).collect(),
                }
            }
        }
    }

    fn select_all(&self, space: &Self::Space) -> Self::Space {
        FixtureEngine::all_space(space.dims.clone())
    }

    fn select_adjust(&self, space: &Self::Space, offset: &[i64]) -> Self::Space {
        let dims = space.dims.clone();
        let from_linear = |mut linear: u64| -> Vec<u64> {
            let s = strides(&dims);
            let mut coords = vec![0u64; dims.len()];
            for i in 0..dims.len() {
                coords[i] = linear / s[i];
                linear %= s[i];
            }
            coords
        };
        let mut out = space.clone();
        out.points = space
            .points
            .iter()
            .map(|&p| {
                let coords = from_linear(p);
                let shifted: Vec<u64> = coords
                    .iter()
                    .zip(offset.iter())
                    .map(|(&c, &o)| (c as i64 - o) as u64)
                    .collect();
                to_linear(&dims, &shifted)
            })
            .collect();
        out
    }

    fn select_project_intersection(
        &self,
        src_space: &Self::Space,
        src_intersect_space: &Self::Space,
        mem_space: &Self::Space,
    ) -> Result<Self::Space> {
        if src_space.points.len() != mem_space.points.len() {
            return Err(bypass_vol::BypassError::Selection(format!(
                "file/memory selection length mismatch: {} vs {}",
                src_space.points.len(),
                mem_space.points.len()
            )));
        }
        let keep: std::collections::HashSet<u64> = src_intersect_space.points.iter().copied().collect();
        let points = src_space
            .points
            .iter()
            .zip(mem_space.points.iter())
            .filter(|(f, _)| keep.contains(f))
            .map(|(_, m)| *m)
            .collect();
        Ok(FixtureSpace {
            dims: mem_space.dims.clone(),
            kind: SelectionKind::Hyperslab,
            points,
        })
    }

    fn select_type(&self, space: &Self::Space) -> SelectionKind {
        space.kind
    }

    fn select_npoints(&self, space: &Self::Space) -> u64 {
        space.points.len() as u64
    }

    fn sequence_iter<'a>(&'a self, space: &'a Self::Space, elem_size: usize) -> Box<dyn SequenceIterator + 'a> {
        Box::new(FixtureSeqIter {
            points: &space.points,
            pos: 0,
            elem_size,
        })
    }

    fn native_dataset_read(
        &self,
        _dataset: &str,
        _mem_type: &str,
        _mem_space: &Self::Space,
        _file_space: &Self::Space,
        _dst: *mut u8,
        _dst_len: usize,
    ) -> Result<()> {
        *self.native_read_calls.lock().unwrap() += 1;
        Ok(())
    }
}
