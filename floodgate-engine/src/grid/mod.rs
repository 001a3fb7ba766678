//! Lock Partition Grid
//!
//! The process-wide "mental map" of locking, made explicit: a fixed
//! stage × data-set matrix of independent lock domains. Every stage body runs
//! under exactly one cell's lock, and two requests contend only if they share
//! both coordinates.
//!
//! # Shape
//!
//! ```text
//!              dataset 0   dataset 1   ...   dataset D-1
//! stage 0      [cell]      [cell]            [cell]
//! stage 1      [cell]      [cell]            [cell]
//! ...
//! stage S-1    [cell]      [cell]            [cell]
//! ```
//!
//! Each cell is independently constructed at startup, addressed by a pure
//! function of `(stage, dataset)`, and the matrix shape is never mutated
//! afterwards.
//!
//! # Rehashing
//!
//! A stage may rehash the data-set index (`mix(key, stage) % D`) so that two
//! requests colliding at one stage are decorrelated at the next. This is a
//! required capability, not a tuning knob: it is what prevents a hot cell
//! from staying hot across the whole pipeline.
//!
//! # Contention Accounting
//!
//! Each cell counts blocking acquisitions. The counters are read by an
//! external statistics collector; the grid itself never repartitions — that
//! is an offline tuning action outside this core.

use crate::pipeline::StageId;
use crate::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use crate::sync::{Mutex, MutexGuard};
use crossbeam_utils::CachePadded;

/// Index of a data-set partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataSetId(pub usize);

/// Policy for assigning a request to a data set at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assignment {
    /// `key % dataset_count`. Deterministic and stateless.
    #[default]
    Static,
    /// The data set with the fewest resident requests at admission time.
    Dynamic,
}

/// Per-stage partition behavior, chosen at stage registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Partitioning {
    /// Keep the data set assigned at admission.
    #[default]
    Inherit,
    /// Rehash `(key, stage)` so collisions at one stage decorrelate at this
    /// one.
    Rehash,
}

/// One lock domain of the grid.
pub struct Cell {
    lock: Mutex<()>,
    /// Blocking acquisitions observed on this cell.
    contention: AtomicU64,
}

impl Cell {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            contention: AtomicU64::new(0),
        }
    }

    /// Acquires the cell's lock, counting the acquisition as contended if it
    /// could not be satisfied immediately.
    pub fn acquire(&self) -> CellGuard<'_> {
        if let Some(guard) = self.lock.try_lock() {
            return CellGuard { _guard: guard };
        }
        self.contention.fetch_add(1, Ordering::Relaxed);
        CellGuard {
            _guard: self.lock.lock(),
        }
    }

    /// Number of blocking acquisitions recorded so far.
    #[inline]
    pub fn contention(&self) -> u64 {
        self.contention.load(Ordering::Relaxed)
    }
}

/// RAII guard for a cell's lock domain.
pub struct CellGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// The stage × data-set matrix of lock cells.
pub struct PartitionGrid {
    cells: Box<[CachePadded<Cell>]>,
    /// Resident-request count per data set, maintained for dynamic
    /// assignment and for statistics.
    load: Box<[CachePadded<AtomicUsize>]>,
    stage_count: usize,
    dataset_count: usize,
    assignment: Assignment,
}

impl PartitionGrid {
    /// Builds the full matrix up front. Shape is immutable afterwards.
    pub fn new(stage_count: usize, dataset_count: usize, assignment: Assignment) -> Self {
        let dataset_count = dataset_count.max(1);
        let stage_count = stage_count.max(1);
        Self {
            cells: (0..stage_count * dataset_count)
                .map(|_| CachePadded::new(Cell::new()))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            load: (0..dataset_count)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            stage_count,
            dataset_count,
            assignment,
        }
    }

    /// Number of stages in the matrix.
    #[inline]
    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// Number of data-set partitions.
    #[inline]
    pub fn dataset_count(&self) -> usize {
        self.dataset_count
    }

    /// Addresses a cell. Pure function of the coordinates.
    #[inline]
    pub fn cell_for(&self, stage: StageId, dataset: DataSetId) -> &Cell {
        let stage = (stage.0 as usize) % self.stage_count;
        let dataset = dataset.0 % self.dataset_count;
        &self.cells[stage * self.dataset_count + dataset]
    }

    /// Assigns a data set for a request entering the pipeline and counts it
    /// as resident there.
    pub fn admit(&self, key: u64) -> DataSetId {
        let dataset = match self.assignment {
            Assignment::Static => DataSetId((key % self.dataset_count as u64) as usize),
            Assignment::Dynamic => {
                let mut best = 0;
                let mut best_load = usize::MAX;
                for (idx, counter) in self.load.iter().enumerate() {
                    let load = counter.load(Ordering::Relaxed);
                    if load < best_load {
                        best = idx;
                        best_load = load;
                    }
                }
                DataSetId(best)
            }
        };
        self.load[dataset.0].fetch_add(1, Ordering::Relaxed);
        dataset
    }

    /// Removes a request from its data set's residency count (terminal
    /// outcome or cancellation).
    pub fn retire(&self, dataset: DataSetId) {
        self.load[dataset.0 % self.dataset_count].fetch_sub(1, Ordering::Relaxed);
    }

    /// Resolves the data set a stage actually locks: the admission-time
    /// assignment for [`Partitioning::Inherit`], or a per-stage rehash for
    /// [`Partitioning::Rehash`].
    #[inline]
    pub fn stage_dataset(
        &self,
        key: u64,
        stage: StageId,
        admitted: DataSetId,
        partitioning: Partitioning,
    ) -> DataSetId {
        match partitioning {
            Partitioning::Inherit => admitted,
            Partitioning::Rehash => {
                let mixed = mix64(key ^ (stage.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                DataSetId((mixed % self.dataset_count as u64) as usize)
            }
        }
    }

    /// Residency count of one data set.
    pub fn load(&self, dataset: DataSetId) -> usize {
        self.load[dataset.0 % self.dataset_count].load(Ordering::Relaxed)
    }

    /// Copies out every cell's contention counter, row-major by stage, for
    /// the external statistics collector.
    pub fn contention_map(&self) -> Vec<u64> {
        self.cells.iter().map(|cell| cell.contention()).collect()
    }

    /// Sum of all contention counters.
    pub fn total_contention(&self) -> u64 {
        self.cells.iter().map(|cell| cell.contention()).sum()
    }
}

/// SplitMix64 finalizer: a full-avalanche mix so neighboring keys and stage
/// ids land in unrelated cells.
#[inline]
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
