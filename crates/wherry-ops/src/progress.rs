//! Byte and file counters with rate, ETA, and stall detection.

use std::time::{Duration, Instant};

use wherry_core::{FileProgress, TotalProgress};

/// Recompute rate and ETA no more often than this.
const UPDATE_INTERVAL: Duration = Duration::from_secs(2);

/// Raise the stalled indicator after this long without input.
const STALL_THRESHOLD: Duration = Duration::from_secs(4);

/// Running counters of one operation.
///
/// Time spent in blocking user prompts is recorded as paused and excluded
/// from rate calculations.
#[derive(Debug)]
pub struct ProgressTracker {
    files_total: u64,
    bytes_total: u64,
    files_done: u64,
    bytes_done: u64,
    op_start: Instant,
    paused: Duration,
    pause_started: Option<Instant>,
    file_total: u64,
    file_done: u64,
    last_input: Instant,
    last_update: Instant,
    bytes_per_second: u64,
    eta_secs: u64,
}

impl ProgressTracker {
    /// Start tracking a fresh operation.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            files_total: 0,
            bytes_total: 0,
            files_done: 0,
            bytes_done: 0,
            op_start: now,
            paused: Duration::ZERO,
            pause_started: None,
            file_total: 0,
            file_done: 0,
            last_input: now,
            last_update: now,
            bytes_per_second: 0,
            eta_secs: 0,
        }
    }

    /// Install the operation totals computed by the pre-pass.
    pub fn set_totals(&mut self, files: u64, bytes: u64) {
        self.files_total = files;
        self.bytes_total = bytes;
    }

    /// Items completed so far.
    pub fn files_done(&self) -> u64 {
        self.files_done
    }

    /// Bytes completed so far, including the file in flight.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done + self.file_done
    }

    /// Begin transferring one file of `size` bytes.
    pub fn begin_file(&mut self, size: u64) {
        self.file_total = size;
        self.file_done = 0;
        self.last_input = Instant::now();
    }

    /// Record `n` bytes moved for the current file.
    pub fn add_file_bytes(&mut self, n: u64) {
        self.file_done += n;
        self.last_input = Instant::now();
    }

    /// Finish one item. `counted` is false for nested entries of a tree
    /// whose totals were never computed, so the counters stay consistent
    /// with what the pre-pass promised.
    pub fn complete_item(&mut self, bytes: u64, counted: bool) {
        self.file_total = 0;
        self.file_done = 0;
        if counted {
            self.files_done += 1;
            self.bytes_done += bytes;
        }
    }

    /// Enter a blocking prompt.
    pub fn pause_begin(&mut self) {
        if self.pause_started.is_none() {
            self.pause_started = Some(Instant::now());
        }
    }

    /// Leave a blocking prompt.
    pub fn pause_end(&mut self) {
        if let Some(started) = self.pause_started.take() {
            self.paused += started.elapsed();
        }
    }

    /// Whether the fixed recompute cadence has elapsed.
    pub fn due(&self) -> bool {
        self.last_update.elapsed() >= UPDATE_INTERVAL
    }

    /// Recompute rate and ETA. Called at the fixed cadence and forced on
    /// user-visible events.
    pub fn refresh(&mut self) {
        self.last_update = Instant::now();
        let active = self
            .op_start
            .elapsed()
            .saturating_sub(self.paused)
            .as_secs()
            .max(1);
        let transferred = self.bytes_done + self.file_done;
        self.bytes_per_second = transferred / active;
        self.eta_secs = if self.bytes_per_second > 0 && self.bytes_total > transferred {
            (self.bytes_total - transferred) / self.bytes_per_second
        } else {
            0
        };
    }

    /// Whether no bytes have arrived for longer than the stall threshold.
    pub fn stalled(&self) -> bool {
        self.file_total > 0 && self.last_input.elapsed() >= STALL_THRESHOLD
    }

    /// The current file's progress.
    pub fn file_progress(&self) -> FileProgress {
        FileProgress {
            done: self.file_done,
            total: self.file_total,
        }
    }

    /// The operation-wide progress.
    pub fn snapshot(&self) -> TotalProgress {
        TotalProgress {
            files_done: self.files_done,
            files_total: self.files_total,
            bytes_done: self.bytes_done + self.file_done,
            bytes_total: self.bytes_total,
            bytes_per_second: self.bytes_per_second,
            eta_secs: self.eta_secs,
            stalled: self.stalled(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_counted_items() {
        let mut p = ProgressTracker::new();
        p.set_totals(2, 100);
        p.begin_file(60);
        p.add_file_bytes(60);
        p.complete_item(60, true);
        p.complete_item(40, false);
        assert_eq!(p.files_done(), 1);
        assert_eq!(p.bytes_done(), 60);
    }

    #[test]
    fn in_flight_bytes_show_in_snapshot() {
        let mut p = ProgressTracker::new();
        p.set_totals(1, 100);
        p.begin_file(100);
        p.add_file_bytes(30);
        assert_eq!(p.snapshot().bytes_done, 30);
        assert_eq!(p.file_progress().done, 30);
        assert_eq!(p.file_progress().total, 100);
    }

    #[test]
    fn paused_time_reduces_active_window() {
        let mut p = ProgressTracker::new();
        p.pause_begin();
        std::thread::sleep(Duration::from_millis(20));
        p.pause_end();
        assert!(p.paused >= Duration::from_millis(20));
        // Nested begin calls do not reset the start.
        p.pause_begin();
        p.pause_begin();
        p.pause_end();
        assert!(p.pause_started.is_none());
    }

    #[test]
    fn refresh_computes_rate_floor_one_second() {
        let mut p = ProgressTracker::new();
        p.set_totals(1, 1000);
        p.begin_file(1000);
        p.add_file_bytes(500);
        p.refresh();
        // Elapsed rounds up to one second, so the rate equals transferred.
        assert_eq!(p.snapshot().bytes_per_second, 500);
        assert_eq!(p.snapshot().eta_secs, 1);
    }
}
