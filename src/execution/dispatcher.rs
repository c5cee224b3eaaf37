//! Fork-join dispatch of one division across worker threads.
//!
//! The dispatcher owns a dedicated rayon pool. For every division it cuts the
//! region into at most `max_threads` partitions along the longest axis, runs
//! one task per partition, and blocks until all of them have settled. Results
//! always come back in partition order, whatever the completion order was.

use crate::core::error::{ComputeError, ConfigurationError, ResourceError, TilestreamResult};
use crate::core::region::ImageRegion;
use crate::core::splitter::split_axis;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Splits a division for worker threads and fork/joins the per-tile work.
pub struct ThreadDispatcher {
    pool: rayon::ThreadPool,
    max_threads: usize,
    min_lines: u64,
}

impl std::fmt::Debug for ThreadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadDispatcher")
            .field("max_threads", &self.max_threads)
            .field("min_lines", &self.min_lines)
            .finish()
    }
}

impl ThreadDispatcher {
    /// Create a dispatcher with at most `max_threads` workers (0 = one per
    /// available core) and partitions of at least `min_lines` lines.
    pub fn new(max_threads: usize, min_lines: u64) -> TilestreamResult<Self> {
        let threads = if max_threads == 0 {
            rayon::current_num_threads()
        } else {
            max_threads
        };
        if min_lines == 0 {
            return Err(ConfigurationError::InvalidParameter {
                filter: "dispatcher".to_string(),
                parameter: "min_lines_per_thread".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tilestream-worker-{}", i))
            .build()
            .map_err(|e| ResourceError::ThreadPool {
                threads,
                message: e.to_string(),
            })?;
        log::debug!("Dispatcher ready with {} worker thread(s)", threads);
        Ok(Self {
            pool,
            max_threads: threads,
            min_lines,
        })
    }

    /// Thread ceiling.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Number of partitions `partition(region)` produces.
    pub fn thread_count(&self, region: &ImageRegion) -> usize {
        self.thread_count_capped(region, self.max_threads)
    }

    fn thread_count_capped(&self, region: &ImageRegion, cap: usize) -> usize {
        if region.is_empty() {
            return 0;
        }
        let extent = region.size()[region.longest_axis()];
        let by_lines = (extent / self.min_lines).max(1);
        (cap.max(1) as u64).min(by_lines) as usize
    }

    /// Split `region` for the worker threads.
    pub fn partition(&self, region: &ImageRegion) -> Vec<ImageRegion> {
        self.partition_capped(region, self.max_threads)
    }

    /// Split `region` for at most `cap` threads.
    pub fn partition_capped(&self, region: &ImageRegion, cap: usize) -> Vec<ImageRegion> {
        let count = self.thread_count_capped(region, cap);
        if count == 0 {
            return Vec::new();
        }
        split_axis(region, region.longest_axis(), count).unwrap_or_else(|_| vec![*region])
    }

    /// Run `task(thread_index, partition)` once per partition and join.
    ///
    /// Every task runs to completion even when a sibling fails; the error of
    /// the lowest failing thread index is returned.
    pub fn run<R, F>(&self, partitions: &[ImageRegion], task: F) -> Result<Vec<R>, ComputeError>
    where
        R: Send,
        F: Fn(usize, &ImageRegion) -> Result<R, ComputeError> + Sync,
    {
        log::debug!("Dispatching {} partition(s)", partitions.len());
        let results: Vec<Result<R, ComputeError>> = self.pool.install(|| {
            partitions
                .par_iter()
                .enumerate()
                .map(|(index, partition)| guarded(index, || task(index, partition)))
                .collect()
        });
        results.into_iter().collect()
    }

    /// Like [`run`](Self::run), with one exclusively owned slot per thread.
    ///
    /// `slots` must hold exactly one entry per partition.
    pub fn run_with_slots<S, F>(
        &self,
        partitions: &[ImageRegion],
        slots: &mut [S],
        task: F,
    ) -> Result<(), ComputeError>
    where
        S: Send,
        F: Fn(usize, &ImageRegion, &mut S) -> Result<(), ComputeError> + Sync,
    {
        if slots.len() != partitions.len() {
            return Err(ComputeError::SlotMismatch {
                slots: slots.len(),
                partitions: partitions.len(),
            });
        }
        log::debug!("Dispatching {} partition(s) with slots", partitions.len());
        let results: Vec<Result<(), ComputeError>> = self.pool.install(|| {
            slots
                .par_iter_mut()
                .zip(partitions.par_iter())
                .enumerate()
                .map(|(index, (slot, partition))| guarded(index, || task(index, partition, slot)))
                .collect()
        });
        results.into_iter().collect()
    }
}

fn guarded<R>(
    thread: usize,
    task: impl FnOnce() -> Result<R, ComputeError>,
) -> Result<R, ComputeError> {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(result) => {
            if let Err(error) = &result {
                log::error!("Task on thread {} failed: {}", thread, error);
            }
            result
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("Task on thread {} panicked: {}", thread, message);
            Err(ComputeError::Panicked { thread, message })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
