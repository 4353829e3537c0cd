//! Configuration surface (§6), consolidated into one struct with `Default`.
//!
//! `spec.md` scatters these knobs across §4.10 and §6; they are gathered here
//! for discoverability, the way the donor crate centralizes its own tunables
//! (`CheckpointConfig`/`CheckpointPolicy` in its `checkpoint.rs`). Field names
//! for the thread-pool knobs are grounded directly on
//! `examples/original_source/src/jogasaki/scheduler/thread_params.h`.

use std::time::Duration;

/// Key-distribution strategy for exchange partitioning. `Simple` is the only
/// kind named in §6 ("key-distribution ∈ {simple, …}"); the open-ended "…"
/// is modeled as a reserved variant rather than guessed at.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum KeyDistribution {
    #[default]
    Simple,
}

/// Thread-pool / scheduler tunables, field-for-field matching
/// `thread_params.h`.
#[derive(Clone, Debug)]
pub struct ThreadParams {
    pub threads: usize,
    pub set_core_affinity: bool,
    pub initial_core: usize,
    pub assign_numa_nodes_uniformly: bool,
    pub randomize_memory_usage: bool,
    pub force_numa_node: Option<usize>,
    pub stealing_enabled: bool,
    pub use_preferred_worker_for_current_thread: bool,
    pub stealing_wait: Duration,
    pub task_polling_wait: Duration,
    pub busy_worker: bool,
    pub watcher_interval: Duration,
    pub worker_try_count: u32,
    pub worker_suspend_timeout: Duration,
    pub thousandths_ratio_check_local_first: u32,
}

impl Default for ThreadParams {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            set_core_affinity: false,
            initial_core: 0,
            assign_numa_nodes_uniformly: false,
            randomize_memory_usage: false,
            force_numa_node: None,
            stealing_enabled: true,
            use_preferred_worker_for_current_thread: true,
            stealing_wait: Duration::from_micros(1000),
            task_polling_wait: Duration::from_micros(1000),
            busy_worker: false,
            watcher_interval: Duration::from_millis(1),
            worker_try_count: 1000,
            worker_suspend_timeout: Duration::from_millis(1),
            thousandths_ratio_check_local_first: 1000,
        }
    }
}

/// Top-level engine configuration, covering the rest of §6's "Configuration
/// surface" list beyond the thread pool.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub thread_params: ThreadParams,
    pub default_partitions: usize,
    pub use_sorted_vector: bool,
    pub noop_pregroup: bool,
    pub scan_default_parallel: usize,
    pub rtx_parallel_scan: bool,
    pub key_distribution: KeyDistribution,
    pub inplace_teardown: bool,
    pub enable_storage_key: bool,
    pub default_commit_response: CommitResponseKind,
    pub page_size: usize,
}

/// Commit response kind the CC engine's `commit` callback may carry (§6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CommitResponseKind {
    Accepted,
    Available,
    Stored,
    Propagated,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_params: ThreadParams::default(),
            default_partitions: 1,
            use_sorted_vector: false,
            noop_pregroup: false,
            scan_default_parallel: 1,
            rtx_parallel_scan: false,
            key_distribution: KeyDistribution::Simple,
            inplace_teardown: false,
            enable_storage_key: false,
            default_commit_response: CommitResponseKind::Stored,
            page_size: crate::arena::DEFAULT_PAGE_SIZE,
        }
    }
}
