//! Concurrent Monte-Carlo averaging of voxel fields.
//!
//! [`ParallelAverager`] runs `N` independent draws of a [`FieldSampler`] on a
//! fixed set of scoped worker threads and returns their voxel-wise mean.
//!
//! Work is pulled, not partitioned: every worker claims the next sample
//! index from one shared atomic counter until the counter passes `N`, so
//! uneven draw costs never leave a worker idle. Each worker sums its draws
//! into a private field and merges that field into the shared accumulator
//! once, under a single mutex.
//!
//! Each worker owns a [`StdRng`] seeded with `seed.wrapping_add(worker)`.
//! Which worker claims which index depends on scheduling, so results are
//! reproducible only statistically unless a single worker is used.
//!
//! A draw that fails, or a worker that panics, is fatal to the pass: the
//! remaining workers stop claiming indices and no partial average is
//! returned.

use log::{debug, info, warn};
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;
use survey::{VoxelGrid, VoxelMap};

use crate::error::MapError;

/// Source of one grid-shaped scalar field per invocation.
///
/// Implementations read shared state only; all randomness comes from `rng`,
/// which belongs to the calling worker.
pub trait FieldSampler: Sync {
    fn draw_field(&self, grid: &VoxelGrid, rng: &mut StdRng) -> Result<Array3<f64>, MapError>;
}

impl<F> FieldSampler for F
where
    F: Fn(&VoxelGrid, &mut StdRng) -> Result<Array3<f64>, MapError> + Sync,
{
    fn draw_field(&self, grid: &VoxelGrid, rng: &mut StdRng) -> Result<Array3<f64>, MapError> {
        self(grid, rng)
    }
}

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Averages `samples` draws of a sampler over one grid.
#[derive(Debug, Clone)]
pub struct ParallelAverager {
    grid: VoxelGrid,
    samples: usize,
    workers: usize,
    seed: u64,
}

impl ParallelAverager {
    /// Averager over `grid` using all available hardware threads and seed 0.
    pub fn new(grid: VoxelGrid, samples: usize) -> Self {
        Self {
            grid,
            samples,
            workers: default_workers(),
            seed: 0,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run the pass and return the mean field.
    ///
    /// # Returns
    /// * `Ok(VoxelMap)` - Sum of exactly `samples` draws divided by `samples`
    /// * `Err(MapError::NoSamples | NoWorkers)` - On a zero sample or worker count
    /// * `Err(MapError::WorkerPanicked)` - If any worker panicked
    /// * `Err(_)` - The first sampler error, in worker order
    pub fn average<S: FieldSampler + ?Sized>(&self, sampler: &S) -> Result<VoxelMap, MapError> {
        if self.samples == 0 {
            return Err(MapError::NoSamples);
        }
        if self.workers == 0 {
            return Err(MapError::NoWorkers);
        }
        let workers = self.workers.min(self.samples);

        debug!(
            "Averaging {} draws over {:?} voxels with {} workers (seed {})",
            self.samples,
            self.grid.shape(),
            workers,
            self.seed
        );
        let start = Instant::now();

        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let total = Mutex::new(Accumulator {
            sum: self.grid.zeros(),
            completed: 0,
        });

        let outcomes: Vec<Result<(), MapError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let (next, failed, total) = (&next, &failed, &total);
                    scope.spawn(move || self.run_worker(worker, sampler, next, failed, total))
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(worker, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        warn!("Averaging worker {worker} panicked");
                        Err(MapError::WorkerPanicked { worker })
                    })
                })
                .collect()
        });

        if let Some(err) = outcomes.into_iter().find_map(Result::err) {
            return Err(err);
        }

        let Accumulator { mut sum, completed } =
            total.into_inner().map_err(|_| MapError::AccumulatorPoisoned)?;
        if completed != self.samples {
            return Err(MapError::IncompletePass {
                completed,
                expected: self.samples,
            });
        }
        sum /= self.samples as f64;

        info!(
            "Averaged {} draws on {} workers in {:.2?}",
            self.samples,
            workers,
            start.elapsed()
        );

        Ok(VoxelMap::new(self.grid.clone(), sum)?)
    }

    fn run_worker<S: FieldSampler + ?Sized>(
        &self,
        worker: usize,
        sampler: &S,
        next: &AtomicUsize,
        failed: &AtomicBool,
        total: &Mutex<Accumulator>,
    ) -> Result<(), MapError> {
        let _flag = FailOnPanic(failed);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(worker as u64));
        let mut partial = self.grid.zeros();
        let mut drawn = 0usize;

        while !failed.load(Ordering::Relaxed) {
            if next.fetch_add(1, Ordering::Relaxed) >= self.samples {
                break;
            }
            match sampler
                .draw_field(&self.grid, &mut rng)
                .and_then(|field| self.check_shape(field))
            {
                Ok(field) => {
                    partial += &field;
                    drawn += 1;
                }
                Err(e) => {
                    failed.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }

        if failed.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut total = total.lock().map_err(|_| MapError::AccumulatorPoisoned)?;
        total.sum += &partial;
        total.completed += drawn;
        debug!("Worker {worker} merged {drawn} draws");
        Ok(())
    }

    fn check_shape(&self, field: Array3<f64>) -> Result<Array3<f64>, MapError> {
        if field.dim() == self.grid.shape() {
            Ok(field)
        } else {
            Err(MapError::ShapeMismatch {
                expected: self.grid.shape(),
                found: field.dim(),
            })
        }
    }
}

struct Accumulator {
    sum: Array3<f64>,
    completed: usize,
}

/// Raises the shared failure flag if the owning worker unwinds.
struct FailOnPanic<'a>(&'a AtomicBool);

impl Drop for FailOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::Relaxed);
        }
    }
}
