//! The connector itself: composes identity, configuration, and
//! [`GlobalState`] into the single type a host embeds (spec §6 "Identity",
//! inbound contract).
//!
//! Grounded on the teacher's top-level `Session<FS>`: the type a caller
//! actually constructs and drives, gluing together mount options,
//! the filesystem implementation, and (in the threaded variant) the
//! worker pool underneath.

use std::path::Path;

use crate::config::{ConnectorConfig, CONNECTOR_ID, CONNECTOR_NAME};
use crate::dispatcher::{DispatchOutcome, ReadTuple};
use crate::env::Tunables;
use crate::error::{BypassError, Result};
use crate::file_handle::FileHandle;
use crate::host::HostEngine;
use crate::state::GlobalState;
use std::sync::Arc;

/// The read-path bypass connector (spec §1, §6). `H` is the concrete
/// underlying storage engine this instance plugs into.
pub struct Connector<H: HostEngine> {
    config: ConnectorConfig,
    state: GlobalState<H>,
}

impl<H: HostEngine> Connector<H> {
    pub fn identity() -> (i64, &'static str) {
        (CONNECTOR_ID, CONNECTOR_NAME)
    }

    /// Construct a connector from its host-supplied configuration string
    /// and environment-derived tunables (spec §6: identity + the
    /// `BYPASS_VOL_*` table).
    pub fn new(config_str: &str, log_path: impl AsRef<Path>) -> Result<Self> {
        let config = ConnectorConfig::parse(config_str)?;
        let tunables = Tunables::from_env();
        Ok(Self {
            config,
            state: GlobalState::new(tunables, log_path),
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn state(&self) -> &GlobalState<H> {
        &self.state
    }

    /// File-create/open (spec §6 inbound contract item 2): forward to the
    /// underlying engine is the host's job; this attaches the shadow.
    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<Arc<FileHandle>> {
        self.state.open_file(path)
    }

    /// Dataset-create/open (spec §6 inbound contract item 2): attach a
    /// [`crate::dataset_shadow::DatasetShadow`] to the dataset the host
    /// already opened through the underlying engine.
    pub fn attach_dataset(
        &self,
        name: impl Into<String>,
        shadow: crate::dataset_shadow::DatasetShadow<H::Space>,
    ) {
        let name = name.into();
        self.state.register_dataset(name, shadow);
    }

    pub fn detach_dataset(&self, name: &str) {
        self.state.release_dataset(name);
    }

    /// Dataset-read (spec §6 inbound contract item 3): run the decision
    /// machine and either service the read through the bypass pipeline or
    /// forward it, unchanged, to the underlying engine exactly once
    /// (spec §8 invariant 6).
    pub fn dataset_read(&self, host: &H, dataset: &str, tuple: ReadTuple<H::Space>) -> Result<()> {
        let mem_type = tuple.mem_type.clone();
        let mem_space = tuple.mem_space.clone();
        let file_space = tuple.file_space.clone();
        let dst_ptr = tuple.dst_ptr;
        let dst_len = tuple.dst_len;

        match self.state.dispatch_read(host, dataset, tuple)? {
            DispatchOutcome::Bypassed { .. } | DispatchOutcome::Noop => Ok(()),
            DispatchOutcome::FallBack => {
                let shadow = self.state.dataset(dataset).ok_or_else(|| BypassError::Classification {
                    dataset: dataset.to_string(),
                    reason: "no shadow registered for this dataset".to_string(),
                })?;
                let file_space = file_space.unwrap_or_else(|| shadow.space.clone());
                host.native_dataset_read(dataset, &mem_type, &mem_space, &file_space, dst_ptr, dst_len)
            }
        }
    }

    /// Process-terminate: flush the logger and join worker threads (spec
    /// §4.3 "Shutdown", §4.4).
    pub fn terminate(self) -> Result<()> {
        self.state.terminate()
    }
}
