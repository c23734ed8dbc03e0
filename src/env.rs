//! Environment-derived tunables (spec §6).
//!
//! Modelled on the teacher's `mnt::mount_options::Config`: a small,
//! validated configuration struct built once at startup rather than
//! re-read on every access.

use std::env;

const NTHREADS_VAR: &str = "BYPASS_VOL_NTHREADS";
const NSTEPS_VAR: &str = "BYPASS_VOL_NSTEPS";
const MAX_NELMTS_VAR: &str = "BYPASS_VOL_MAX_NELMTS";
const NO_TPOOL_VAR: &str = "BYPASS_VOL_NO_TPOOL";

const MIN_THREADS: usize = 1;
const MAX_THREADS: usize = 32;

/// Tunables read once from the environment at connector init (spec §6's
/// table). Clamping happens here, not at the call sites that consume
/// these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Worker count, clamped to `[1, 32]`. Default 1.
    pub n_threads: usize,
    /// Minimum per-worker batch pull from the queue. Default 1.
    pub n_steps: usize,
    /// Upper bound on elements per emitted Task. Default 1.
    ///
    /// This default means the out-of-the-box build emits one Task per
    /// element for contiguous datasets, which is almost certainly too
    /// conservative (spec §9's open question); it is preserved here
    /// because the spec requires it, not because it's a good default.
    pub max_nelmts: usize,
    /// If true, the thread pool is disabled and the dispatcher drains
    /// tasks on the calling thread using a private queue (spec §4.1
    /// "serial mode").
    pub no_tpool: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            n_threads: MIN_THREADS,
            n_steps: 1,
            max_nelmts: 1,
            no_tpool: false,
        }
    }
}

impl Tunables {
    /// Read and validate tunables from the process environment.
    /// Malformed numeric values fall back to the default for that field
    /// rather than failing connector init outright — these are
    /// performance knobs, not correctness-affecting configuration.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let n_threads = env::var(NTHREADS_VAR)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|n| n.clamp(MIN_THREADS, MAX_THREADS))
            .unwrap_or(defaults.n_threads);
        let n_steps = env::var(NSTEPS_VAR)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|n| n.max(1))
            .unwrap_or(defaults.n_steps);
        let max_nelmts = env::var(MAX_NELMTS_VAR)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|n| n.max(1))
            .unwrap_or(defaults.max_nelmts);
        let no_tpool = env::var(NO_TPOOL_VAR)
            .map(|v| v == "true")
            .unwrap_or(false);

        Self {
            n_threads,
            n_steps,
            max_nelmts,
            no_tpool,
        }
    }

    pub fn is_serial(&self) -> bool {
        self.no_tpool
    }
}
