//! Statistics tracking for arena throughput

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Snapshot of arena traffic
#[derive(Debug, Clone)]
pub struct ArenaStats {
    /// Total bytes received from sessions
    pub input_bytes: u64,
    /// Total bytes delivered to connections
    pub output_bytes: u64,
    /// Actions that made it through persistence
    pub actions_applied: u64,
    /// State broadcasts performed
    pub broadcasts: u64,
    /// Timestamp when stats collection started
    pub start_time: Instant,
    /// Input throughput in KB/s
    pub input_kbps: f64,
    /// Output throughput in KB/s
    pub output_kbps: f64,
}

impl ArenaStats {
    /// Update throughput calculations based on elapsed time
    pub fn update_throughput(&mut self) {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if elapsed_secs > 0.0 {
            self.input_kbps = (self.input_bytes as f64) / 1024.0 / elapsed_secs;
            self.output_kbps = (self.output_bytes as f64) / 1024.0 / elapsed_secs;
        }
    }
}

impl std::fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Input: {:.2} KB/s ({} bytes), Output: {:.2} KB/s ({} bytes), {} actions, {} broadcasts",
            self.input_kbps,
            self.input_bytes,
            self.output_kbps,
            self.output_bytes,
            self.actions_applied,
            self.broadcasts
        )
    }
}

/// Thread-safe statistics tracker
///
/// Uses atomic operations for lock-free concurrent updates
#[derive(Debug, Clone)]
pub struct StatsTracker {
    input_bytes: Arc<AtomicU64>,
    output_bytes: Arc<AtomicU64>,
    actions_applied: Arc<AtomicU64>,
    broadcasts: Arc<AtomicU64>,
    start_time: Instant,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            input_bytes: Arc::new(AtomicU64::new(0)),
            output_bytes: Arc::new(AtomicU64::new(0)),
            actions_applied: Arc::new(AtomicU64::new(0)),
            broadcasts: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn add_input_bytes(&self, bytes: usize) {
        self.input_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_output_bytes(&self, bytes: usize) {
        self.output_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn count_action(&self) {
        self.actions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn get_stats(&self) -> ArenaStats {
        let mut stats = ArenaStats {
            input_bytes: self.input_bytes.load(Ordering::Relaxed),
            output_bytes: self.output_bytes.load(Ordering::Relaxed),
            actions_applied: self.actions_applied.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            start_time: self.start_time,
            input_kbps: 0.0,
            output_kbps: 0.0,
        };
        stats.update_throughput();
        stats
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.input_bytes.store(0, Ordering::Relaxed);
        self.output_bytes.store(0, Ordering::Relaxed);
        self.actions_applied.store(0, Ordering::Relaxed);
        self.broadcasts.store(0, Ordering::Relaxed);
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
