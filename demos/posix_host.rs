// A minimal wiring example: a `HostEngine` backed by a handful of
// in-memory dataset descriptions, driven through `Connector`.
//
// Run with:
//
//     RUST_LOG=info cargo run --example posix_host

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use bypass_vol::{
    ByteOrder, ChunkInfo, Class, Connector, DatasetShadow, ElementType, HostEngine, HyperslabOp,
    Layout, ReadTuple, Result, SelectionKind, SequenceIterator, Sign, StorageStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct DemoSpace {
    dims: Vec<u64>,
    kind: SelectionKind,
    points: Vec<u64>,
}

fn regular_hyperslab_points(dims: &[u64], start: &[u64], stride: &[u64], count: &[u64], block: &[u64]) -> Vec<u64> {
    let ndim = dims.len();
    let strides: Vec<u64> = {
        let mut s = vec![1u64; ndim];
        for i in (0..ndim.saturating_sub(1)).rev() {
            s[i] = s[i + 1] * dims[i + 1];
        }
        s
    };
    let mut out = Vec::new();
    if count.iter().any(|&c| c == 0) {
        return out;
    }
    let mut idx = vec![0u64; ndim];
    let mut blk = vec![0u64; ndim];
    loop {
        let coords: Vec<u64> = (0..ndim).map(|d| start[d] + idx[d] * stride[d] + blk[d]).collect();
        if coords.iter().zip(dims.iter()).all(|(c, d)| c < d) {
            out.push(coords.iter().zip(strides.iter()).map(|(c, s)| c * s).sum());
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

struct DemoDataset {
    file: String,
    element_type: ElementType,
    layout: Layout,
    dims: Vec<u64>,
}

struct DemoEngine {
    datasets: HashMap<String, DemoDataset>,
    native_read_calls: Mutex<usize>,
}

impl DemoEngine {
    fn all_space(dims: Vec<u64>) -> DemoSpace {
        let start = vec![0u64; dims.len()];
        let stride = vec![1u64; dims.len()];
        let block = vec![1u64; dims.len()];
        let points = regular_hyperslab_points(&dims, &start, &stride, &dims, &block);
        DemoSpace { dims, kind: SelectionKind::All, points }
    }

    fn dataset(&self, name: &str) -> Result<&DemoDataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| bypass_vol::BypassError::Classification {
                dataset: name.to_string(),
                reason: "unknown dataset".to_string(),
            })
    }
}

struct DemoSeqIter<'a> {
    points: &'a [u64],
    pos: usize,
    elem_size: usize,
}

impl<'a> SequenceIterator for DemoSeqIter<'a> {
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
            out.push((run_start * self.elem_size as u64, run_len * self.elem_size as u64));
            self.pos = next;
        }
        out
    }
}

impl HostEngine for DemoEngine {
    type Space = DemoSpace;

    fn native_int_size(&self) -> usize {
        4
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
        Ok(DemoEngine::all_space(self.dataset(dataset)?.dims.clone()))
    }

    fn dataset_filter_count(&self, _dataset: &str) -> Result<usize> {
        Ok(0)
    }

    fn dataset_external_file_count(&self, _dataset: &str) -> Result<usize> {
        Ok(0)
    }

    fn dataset_storage_status(&self, _dataset: &str) -> Result<StorageStatus> {
        Ok(StorageStatus::Allocated)
    }

    fn dataset_contiguous_addr(&self, _dataset: &str) -> Result<Option<u64>> {
        Ok(Some(0))
    }

    fn dataset_chunk_dims(&self, _dataset: &str) -> Result<Option<Vec<u64>>> {
        Ok(None)
    }

    fn chunk_iter(&self, _dataset: &str) -> Result<Vec<ChunkInfo>> {
        Ok(Vec::new())
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
            HyperslabOp::Set => DemoSpace { dims: space.dims.clone(), kind: SelectionKind::Hyperslab, points: new_points },
            HyperslabOp::And => {
                let set: std::collections::HashSet<u64> = new_points.into_iter().collect();
                DemoSpace {
                    dims: space.dims.clone(),
                    kind: SelectionKind::Hyperslab,
                    points: space.points.iter().copied().filter(|p| set.contains(p)).collect(),
                }
            }
        }
    }

    fn select_all(&self, space: &Self::Space) -> Self::Space {
        DemoEngine::all_space(space.dims.clone())
    }

    fn select_adjust(&self, space: &Self::Space, _offset: &[i64]) -> Self::Space {
        space.clone()
    }

    fn select_project_intersection(
        &self,
        src_space: &Self::Space,
        src_intersect_space: &Self::Space,
        mem_space: &Self::Space,
    ) -> Result<Self::Space> {
        let keep: std::collections::HashSet<u64> = src_intersect_space.points.iter().copied().collect();
        let points = src_space
            .points
            .iter()
            .zip(mem_space.points.iter())
            .filter(|(f, _)| keep.contains(f))
            .map(|(_, m)| *m)
            .collect();
        Ok(DemoSpace { dims: mem_space.dims.clone(), kind: SelectionKind::Hyperslab, points })
    }

    fn select_type(&self, space: &Self::Space) -> SelectionKind {
        space.kind
    }

    fn select_npoints(&self, space: &Self::Space) -> u64 {
        space.points.len() as u64
    }

    fn sequence_iter<'a>(&'a self, space: &'a Self::Space, elem_size: usize) -> Box<dyn SequenceIterator + 'a> {
        Box::new(DemoSeqIter { points: &space.points, pos: 0, elem_size })
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

fn main() -> Result<()> {
    env_logger::init();

    let mut data_file = tempfile::NamedTempFile::new().expect("create backing file");
    let payload: Vec<u8> = (0..32i32).flat_map(i32::to_le_bytes).collect();
    data_file.write_all(&payload).expect("write payload");

    let log_file = tempfile::NamedTempFile::new().expect("create log file");

    let mut datasets = HashMap::new();
    datasets.insert(
        "/readings".to_string(),
        DemoDataset {
            file: data_file.path().to_string_lossy().into_owned(),
            element_type: ElementType::from_raw("/readings", 0, 4, 0, 0).expect("known type codes"),
            layout: Layout::Contiguous,
            dims: vec![32],
        },
    );
    let host = DemoEngine { datasets, native_read_calls: Mutex::new(0) };

    let connector: Connector<DemoEngine> =
        Connector::new("under_vol=0;under_info={native}", log_file.path())?;
    let file = connector.open_file(data_file.path())?;

    let shadow = DatasetShadow::new(
        file,
        "/readings",
        ElementType::from_raw("/readings", 0, 4, 0, 0).expect("known type codes"),
        Layout::Contiguous,
        DemoEngine::all_space(vec![32]),
        0,
        None,
        StorageStatus::Allocated,
        0,
        Some(0),
    );
    connector.attach_dataset("/readings", shadow);

    let mut buf = vec![0u8; 32 * 4];
    let tuple = ReadTuple {
        mem_type: "native".into(),
        mem_space: DemoEngine::all_space(vec![32]),
        file_space: None,
        dst_ptr: buf.as_mut_ptr(),
        dst_len: buf.len(),
    };
    connector.dataset_read(&host, "/readings", tuple)?;

    println!("read {} bytes through the bypass path", buf.len());
    println!("underlying engine invoked {} time(s)", *host.native_read_calls.lock().unwrap());

    connector.terminate()?;
    Ok(())
}
