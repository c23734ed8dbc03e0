//! Process-wide context object (spec §4.1 DESIGN NOTES: "re-architect as
//! an explicit context object owned by the connector instance"; C9).
//!
//! Grounded on the teacher's `MtSession<FS>`: one struct owning the
//! worker pool, the shared queue, and whatever per-session bookkeeping
//! the filesystem needs, constructed once at mount and torn down once at
//! unmount. Here the same shape owns the task pipeline plus the file and
//! dataset-shadow registries, constructed once at connector init and torn
//! down once at terminate — explicitly, not as file-scoped statics.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::dataset_shadow::DatasetShadow;
use crate::dispatcher::{DispatchOutcome, ReadDispatcher, ReadTuple, Runtime};
use crate::env::Tunables;
use crate::error::{BypassError, Result};
use crate::file_handle::FileHandle;
use crate::host::HostEngine;
use crate::logger::Logger;
use crate::pool::ThreadPool;
use crate::task::TaskQueue;

/// Owns everything with process-wide lifetime: the tunables, the task
/// pipeline (pool or serial), the logger, and the file/dataset registries
/// that back-references in [`DatasetShadow`]/[`FileHandle`] are drawn
/// from.
pub struct GlobalState<H: HostEngine> {
    pub tunables: Tunables,
    pool: Option<ThreadPool>,
    dispatcher: ReadDispatcher,
    files: Mutex<HashMap<String, Arc<FileHandle>>>,
    datasets: Mutex<HashMap<String, Arc<DatasetShadow<H::Space>>>>,
    log_path: PathBuf,
    _host: PhantomData<fn() -> H>,
}

impl<H: HostEngine> GlobalState<H> {
    pub fn new(tunables: Tunables, log_path: impl AsRef<Path>) -> Self {
        let logger = Arc::new(Logger::new());
        let (pool, runtime) = if tunables.is_serial() {
            (None, Runtime::Serial)
        } else {
            let queue = Arc::new(TaskQueue::new());
            let pool = ThreadPool::new(tunables.n_threads, tunables.n_steps, Arc::clone(&queue));
            (Some(pool), Runtime::Pool(queue))
        };
        let dispatcher = ReadDispatcher::new(tunables.max_nelmts, tunables.n_steps, logger, runtime);
        Self {
            tunables,
            pool,
            dispatcher,
            files: Mutex::new(HashMap::new()),
            datasets: Mutex::new(HashMap::new()),
            log_path: log_path.as_ref().to_path_buf(),
            _host: PhantomData,
        }
    }

    /// Open the raw descriptor backing `path`, sharing one [`FileHandle`]
    /// across every dataset/group child that opens the same path while
    /// it's still referenced (spec §3 "FileHandle lifecycle").
    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<Arc<FileHandle>> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let mut files = self.files.lock().unwrap();
        if let Some(existing) = files.get(&name) {
            if !existing.is_closed() {
                return Ok(Arc::clone(existing));
            }
        }
        let handle = FileHandle::open(path)?;
        files.insert(name, Arc::clone(&handle));
        Ok(handle)
    }

    /// Drop this state's own reference to a file. The underlying
    /// [`FileHandle`] only actually closes once every dataset shadow and
    /// in-flight task has released its `Arc` as well.
    pub fn release_file(&self, name: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        if let Some(handle) = files.remove(name) {
            if Arc::strong_count(&handle) == 1 {
                handle.close()?;
            }
        }
        Ok(())
    }

    pub fn register_dataset(&self, name: impl Into<String>, shadow: DatasetShadow<H::Space>) -> Arc<DatasetShadow<H::Space>> {
        let shadow = Arc::new(shadow);
        self.datasets.lock().unwrap().insert(name.into(), Arc::clone(&shadow));
        shadow
    }

    pub fn release_dataset(&self, name: &str) {
        self.datasets.lock().unwrap().remove(name);
    }

    pub fn dataset(&self, name: &str) -> Option<Arc<DatasetShadow<H::Space>>> {
        self.datasets.lock().unwrap().get(name).cloned()
    }

    /// Run a dataset-read tuple through the decision machine and, if
    /// bypassable, the task pipeline (spec §6 inbound contract, item 3).
    pub fn dispatch_read(&self, host: &H, dataset: &str, tuple: ReadTuple<H::Space>) -> Result<DispatchOutcome> {
        let shadow = self.dataset(dataset).ok_or_else(|| BypassError::Classification {
            dataset: dataset.to_string(),
            reason: "no shadow registered for this dataset".to_string(),
        })?;
        self.dispatcher.dispatch_read(host, &shadow, tuple)
    }

    pub fn thread_count(&self) -> usize {
        self.pool.as_ref().map(ThreadPool::thread_count).unwrap_or(0)
    }

    pub fn logger(&self) -> &Arc<Logger> {
        self.dispatcher.logger()
    }

    /// Process-terminate (spec §4.3 "Shutdown", §4.4 "on process
    /// terminate the table is flushed"). Joins pool workers (if any),
    /// then flushes the logger. In serial mode, appends the single
    /// trailing boundary first (spec §4.4: "In serial mode the logger
    /// emits a single trailing `###`").
    pub fn terminate(self) -> Result<()> {
        if self.tunables.is_serial() {
            self.dispatcher.logger().append_boundary();
        }
        if let Some(pool) = self.pool {
            pool.shutdown();
        }
        self.dispatcher
            .logger()
            .flush_to(&self.log_path)
            .map_err(|source| BypassError::Io {
                file: self.log_path.to_string_lossy().into_owned(),
                offset: 0,
                length: 0,
                source,
            })
    }
}
