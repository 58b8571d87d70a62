//! Operation records and aggregate metrics
//!
//! Every executor call produces one `OperationRecord`, success or failure.
//! Records are retained for the configured reporting window only; aggregate
//! counters run for the lifetime of the engine.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tierio_common::OperationKind;
use uuid::Uuid;

/// Hard cap on retained records, independent of the window
const RECORD_CAP: usize = 4096;

/// Record of a single executor operation
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub id: Uuid,
    pub kind: OperationKind,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
    /// Payload bytes moved; zero for failed operations
    pub bytes: u64,
}

/// Lifetime aggregate counters
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTotals {
    pub total_ops: u64,
    pub failed_ops: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

/// Bounded-window operation metrics
pub struct OperationMetrics {
    window: Duration,
    total_ops: AtomicU64,
    failed_ops: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    records: RwLock<VecDeque<OperationRecord>>,
}

impl OperationMetrics {
    /// Create a metrics sink retaining records for `window`
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            total_ops: AtomicU64::new(0),
            failed_ops: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Record a finished operation
    pub fn record(&self, record: OperationRecord) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        if record.success {
            match record.kind {
                OperationKind::Write => {
                    self.bytes_written.fetch_add(record.bytes, Ordering::Relaxed);
                }
                OperationKind::Read => {
                    self.bytes_read.fetch_add(record.bytes, Ordering::Relaxed);
                }
                OperationKind::Delete => {}
            }
        } else {
            self.failed_ops.fetch_add(1, Ordering::Relaxed);
        }

        let mut records = self.records.write();
        records.push_back(record);
        let cutoff = SystemTime::now().checked_sub(self.window);
        while let Some(front) = records.front() {
            let too_old = cutoff.is_some_and(|c| front.finished_at < c);
            if too_old || records.len() > RECORD_CAP {
                records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Lifetime totals
    #[must_use]
    pub fn totals(&self) -> MetricsTotals {
        MetricsTotals {
            total_ops: self.total_ops.load(Ordering::Relaxed),
            failed_ops: self.failed_ops.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }

    /// Most recent retained records, oldest first
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<OperationRecord> {
        let records = self.records.read();
        records
            .iter()
            .skip(records.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    /// Mean duration of retained operations of `kind`
    #[must_use]
    pub fn average_duration(&self, kind: OperationKind) -> Option<Duration> {
        let records = self.records.read();
        let durations: Vec<Duration> = records
            .iter()
            .filter(|r| r.kind == kind && r.success)
            .map(|r| r.duration)
            .collect();
        if durations.is_empty() {
            return None;
        }
        Some(durations.iter().sum::<Duration>() / durations.len() as u32)
    }

    /// Failures among retained records
    #[must_use]
    pub fn recent_failures(&self) -> u64 {
        self.records.read().iter().filter(|r| !r.success).count() as u64
    }
}
