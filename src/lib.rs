//! Read-path bypass connector for a hierarchical scientific data library.
//!
//! Intercepts bypassable dataset-read requests and services them through
//! a positional-I/O fast path, falling back to the underlying storage
//! engine for anything the decision machine rejects. See
//! [`connector::Connector`] for the type a host embeds.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![allow(clippy::too_many_arguments)]

pub use crate::config::{ConnectorConfig, CONNECTOR_ID, CONNECTOR_NAME};
pub use crate::connector::Connector;
pub use crate::dataset_shadow::DatasetShadow;
pub use crate::dispatcher::{DispatchOutcome, ReadDispatcher, ReadTuple, Runtime};
pub use crate::env::Tunables;
pub use crate::error::{BypassError, Result};
pub use crate::file_handle::FileHandle;
pub use crate::host::{ChunkInfo, HostEngine, HyperslabOp, SequenceIterator};
pub use crate::logger::{LogRecord, Logger};
pub use crate::pool::ThreadPool;
pub use crate::selection::{DecompositionTotals, SelectionEngine};
pub use crate::state::GlobalState;
pub use crate::task::{QueuedIoFailure, SerialQueue, Task, TaskQueue, TaskSink};
pub use crate::types::{ByteOrder, Class, ElementType, Layout, SelectionKind, Sign, StorageStatus};

mod config;
mod connector;
mod dataset_shadow;
mod dispatcher;
mod env;
mod error;
mod file_handle;
mod host;
mod logger;
mod pool;
mod selection;
mod state;
mod task;
mod types;

#[cfg(test)]
mod testutil;
