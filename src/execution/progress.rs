//! Progress tracking for streaming runs.

use crate::core::region::ImageRegion;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// A run has started.
    Started {
        total_divisions: usize,
    },
    /// A division is about to be computed.
    DivisionStarted {
        index: usize,
        region: ImageRegion,
        total: usize,
    },
    /// A division has been consumed by the terminal.
    DivisionCompleted {
        index: usize,
        duration_ms: u64,
        threads: usize,
        total: usize,
    },
    /// Overall progress percentage.
    Progress {
        percent: f32,
        elapsed_ms: u64,
        estimated_remaining_ms: Option<u64>,
    },
    /// The run has completed.
    Completed {
        total_duration_ms: u64,
        divisions: usize,
    },
    /// The run was cancelled.
    Cancelled,
    /// An error occurred.
    Error {
        message: String,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Tracks the divisions of a run and allows cancellation.
///
/// The cancel flag is checked between divisions, so a cancelled run stops
/// after the division in flight. It stays set until [`reset`](Self::reset):
/// a cancellation requested before a run starts cancels that run.
pub struct ProgressTracker {
    total_divisions: AtomicU64,
    completed_divisions: AtomicU64,
    cancelled: AtomicBool,
    start_time: parking_lot::Mutex<Option<Instant>>,
    callback: Option<Arc<ProgressCallback>>,
    division_times: parking_lot::Mutex<Vec<u64>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self {
            total_divisions: AtomicU64::new(0),
            completed_divisions: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            start_time: parking_lot::Mutex::new(None),
            callback: None,
            division_times: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Create a progress tracker wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Start tracking a run of `total_divisions`.
    pub fn start(&self, total_divisions: usize) {
        self.total_divisions.store(total_divisions as u64, Ordering::Relaxed);
        self.completed_divisions.store(0, Ordering::Relaxed);
        self.division_times.lock().clear();
        *self.start_time.lock() = Some(Instant::now());
        self.send_update(ProgressUpdate::Started { total_divisions });
    }

    /// Report that a division has started.
    pub fn division_started(&self, index: usize, region: ImageRegion) {
        self.send_update(ProgressUpdate::DivisionStarted {
            index,
            region,
            total: self.total(),
        });
    }

    /// Report that a division has completed.
    pub fn division_completed(&self, index: usize, duration_ms: u64, threads: usize) {
        self.completed_divisions.fetch_add(1, Ordering::Relaxed);
        self.division_times.lock().push(duration_ms);

        self.send_update(ProgressUpdate::DivisionCompleted {
            index,
            duration_ms,
            threads,
            total: self.total(),
        });
        self.send_progress_update();
    }

    /// Number of divisions completed in the current run.
    pub fn completed(&self) -> usize {
        self.completed_divisions.load(Ordering::Relaxed) as usize
    }

    fn total(&self) -> usize {
        self.total_divisions.load(Ordering::Relaxed) as usize
    }

    /// Check if the run should be cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.send_update(ProgressUpdate::Cancelled);
    }

    /// Clear a cancellation so the next run can proceed.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// Report an error.
    pub fn report_error(&self, message: String) {
        self.send_update(ProgressUpdate::Error { message });
    }

    /// Complete tracking.
    pub fn complete(&self) {
        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: self.elapsed_ms(),
            divisions: self.completed(),
        });
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 100.0;
        }
        (self.completed() as f32 / total as f32) * 100.0
    }

    /// Estimate remaining time in milliseconds.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let times = self.division_times.lock();
        if times.is_empty() {
            return None;
        }
        let average = times.iter().sum::<u64>() / times.len() as u64;
        let remaining = self.total().saturating_sub(self.completed());
        Some(average * remaining as u64)
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_time
            .lock()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }

    fn send_progress_update(&self) {
        self.send_update(ProgressUpdate::Progress {
            percent: self.progress_percent(),
            elapsed_ms: self.elapsed_ms(),
            estimated_remaining_ms: self.estimated_remaining_ms(),
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
