//! Health sampling loop, classification, and history

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};
use tierio_common::{Error, Result};
use tierio_pool::{DrivePool, DriveSlot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Hard cap on retained snapshots per drive, independent of retention time
const HISTORY_CAP: usize = 4096;

/// Usage thresholds driving status classification
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Usage percentage at which a drive is flagged Warning
    pub warning_pct: f64,
    /// Usage percentage at which a drive is flagged Critical
    pub critical_pct: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warning_pct: 80.0,
            critical_pct: 90.0,
        }
    }
}

/// Drive status derived from usage percentage
///
/// Recomputed from scratch on every sample; there is no hysteresis, so a
/// drive oscillating near a boundary flaps between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Classify a usage percentage
    #[must_use]
    pub fn classify(usage_pct: f64, thresholds: &HealthThresholds) -> Self {
        if usage_pct >= thresholds.critical_pct {
            Self::Critical
        } else if usage_pct >= thresholds.warning_pct {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    #[must_use]
    pub fn as_value(&self) -> f64 {
        match self {
            Self::Ok => 0.0,
            Self::Warning => 1.0,
            Self::Critical => 2.0,
        }
    }
}

/// Immutable record of one drive probe
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub drive: PathBuf,
    pub drive_number: u32,
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub usage_pct: f64,
    pub status: HealthStatus,
    /// How long the space probe took
    pub probe_latency: Duration,
    pub sampled_at: SystemTime,
}

impl HealthSnapshot {
    /// Build a snapshot from raw figures
    #[must_use]
    pub fn from_figures(
        drive: PathBuf,
        drive_number: u32,
        total: u64,
        available: u64,
        probe_latency: Duration,
        thresholds: &HealthThresholds,
    ) -> Self {
        let used = total.saturating_sub(available);
        let usage_pct = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            drive,
            drive_number,
            total,
            available,
            used,
            usage_pct,
            status: HealthStatus::classify(usage_pct, thresholds),
            probe_latency,
            sampled_at: SystemTime::now(),
        }
    }

    fn from_slot(slot: &DriveSlot, probe_latency: Duration, thresholds: &HealthThresholds) -> Self {
        Self::from_figures(
            slot.path.clone(),
            slot.drive_number,
            slot.total_space,
            slot.available_space,
            probe_latency,
            thresholds,
        )
    }
}

type Subscriber = Box<dyn Fn(&HealthSnapshot, Option<&str>) + Send + Sync>;
type SubscriberMap = RwLock<HashMap<u64, Subscriber>>;

/// Unsubscribes its callback when dropped
pub struct SubscriptionHandle {
    id: u64,
    subscribers: Weak<SubscriberMap>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.write().remove(&self.id);
        }
    }
}

struct RunState {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background drive health monitor
pub struct HealthMonitor {
    pool: Arc<DrivePool>,
    thresholds: HealthThresholds,
    history: Arc<RwLock<HashMap<PathBuf, VecDeque<HealthSnapshot>>>>,
    subscribers: Arc<SubscriberMap>,
    next_subscriber_id: AtomicU64,
    run: Mutex<Option<RunState>>,
}

impl HealthMonitor {
    /// Create a monitor over `pool`
    #[must_use]
    pub fn new(pool: Arc<DrivePool>, thresholds: HealthThresholds) -> Self {
        Self {
            pool,
            thresholds,
            history: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(1),
            run: Mutex::new(None),
        }
    }

    /// Launch the sampling loop
    ///
    /// Only one loop may run at a time; a second `start` returns
    /// `AlreadyRunning` without side effects. Must be called from within a
    /// tokio runtime.
    pub fn start(&self, sampling_interval: Duration, retention_period: Duration) -> Result<()> {
        let mut run = self.run.lock();
        if run.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let pool = self.pool.clone();
        let thresholds = self.thresholds;
        let history = self.history.clone();
        let subscribers = self.subscribers.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sampling_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        sample_pass(&pool, &thresholds, &history, &subscribers, retention_period);
                    }
                }
            }
            debug!("health monitor loop exited");
        });

        *run = Some(RunState { cancel, handle });
        Ok(())
    }

    /// Signal the loop to stop and wait for it to exit; a no-op if stopped
    pub async fn stop(&self) {
        let state = self.run.lock().take();
        if let Some(state) = state {
            state.cancel.cancel();
            if let Err(e) = state.handle.await {
                warn!(error = %e, "health monitor task did not exit cleanly");
            }
        }
    }

    /// Whether the sampling loop is currently running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Run one sampling pass immediately, outside the loop
    pub fn sample_now(&self, retention_period: Duration) -> Vec<HealthSnapshot> {
        sample_pass(
            &self.pool,
            &self.thresholds,
            &self.history,
            &self.subscribers,
            retention_period,
        )
    }

    /// Register a callback invoked synchronously for every snapshot
    ///
    /// The second argument carries a descriptive message when the status is
    /// not OK. A panicking callback is caught and logged, never allowed to
    /// take down the sampling loop. Dropping the handle unsubscribes.
    pub fn subscribe(
        &self,
        callback: impl Fn(&HealthSnapshot, Option<&str>) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, Box::new(callback));
        SubscriptionHandle {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Retained snapshots for a drive within `[from, to]`
    #[must_use]
    pub fn historical(
        &self,
        drive: &Path,
        from: SystemTime,
        to: SystemTime,
    ) -> Vec<HealthSnapshot> {
        self.history
            .read()
            .get(drive)
            .map(|ring| {
                ring.iter()
                    .filter(|s| s.sampled_at >= from && s.sampled_at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent snapshot for a drive
    #[must_use]
    pub fn latest(&self, drive: &Path) -> Option<HealthSnapshot> {
        self.history
            .read()
            .get(drive)
            .and_then(|ring| ring.back().cloned())
    }

    /// Mean probe latency in milliseconds over the trailing `period`
    #[must_use]
    pub fn average_response_time(&self, drive: &Path, period: Duration) -> Option<f64> {
        let cutoff = SystemTime::now().checked_sub(period)?;
        let history = self.history.read();
        let ring = history.get(drive)?;
        let latencies: Vec<f64> = ring
            .iter()
            .filter(|s| s.sampled_at >= cutoff)
            .map(|s| s.probe_latency.as_secs_f64() * 1000.0)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    }

    /// Export the latest figures per drive in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        use std::fmt::Write;

        let history = self.history.read();
        let mut output = String::with_capacity(1024);
        if history.is_empty() {
            return output;
        }

        let latest: Vec<&HealthSnapshot> =
            history.values().filter_map(|ring| ring.back()).collect();

        writeln!(
            output,
            "# HELP tierio_drive_total_bytes Total drive capacity in bytes"
        )
        .unwrap();
        writeln!(output, "# TYPE tierio_drive_total_bytes gauge").unwrap();
        for snap in &latest {
            writeln!(
                output,
                "tierio_drive_total_bytes{{drive=\"{}\"}} {}",
                snap.drive.display(),
                snap.total
            )
            .unwrap();
        }

        writeln!(
            output,
            "# HELP tierio_drive_available_bytes Available drive space in bytes"
        )
        .unwrap();
        writeln!(output, "# TYPE tierio_drive_available_bytes gauge").unwrap();
        for snap in &latest {
            writeln!(
                output,
                "tierio_drive_available_bytes{{drive=\"{}\"}} {}",
                snap.drive.display(),
                snap.available
            )
            .unwrap();
        }

        writeln!(
            output,
            "# HELP tierio_drive_usage_pct Drive usage percentage"
        )
        .unwrap();
        writeln!(output, "# TYPE tierio_drive_usage_pct gauge").unwrap();
        for snap in &latest {
            writeln!(
                output,
                "tierio_drive_usage_pct{{drive=\"{}\"}} {:.1}",
                snap.drive.display(),
                snap.usage_pct
            )
            .unwrap();
        }

        writeln!(
            output,
            "# HELP tierio_drive_health_status Drive status (0=ok, 1=warning, 2=critical)"
        )
        .unwrap();
        writeln!(output, "# TYPE tierio_drive_health_status gauge").unwrap();
        for snap in &latest {
            writeln!(
                output,
                "tierio_drive_health_status{{drive=\"{}\"}} {}",
                snap.drive.display(),
                snap.status.as_value()
            )
            .unwrap();
        }

        output
    }
}

/// Probe every configured drive once, record history, notify subscribers
fn sample_pass(
    pool: &DrivePool,
    thresholds: &HealthThresholds,
    history: &RwLock<HashMap<PathBuf, VecDeque<HealthSnapshot>>>,
    subscribers: &SubscriberMap,
    retention_period: Duration,
) -> Vec<HealthSnapshot> {
    let mut out = Vec::new();
    for path in pool.drive_paths() {
        let started = Instant::now();
        match pool.refresh(&path) {
            Ok(slot) => {
                let snapshot = HealthSnapshot::from_slot(&slot, started.elapsed(), thresholds);
                if snapshot.status == HealthStatus::Ok {
                    debug!(
                        drive = %snapshot.drive.display(),
                        usage_pct = snapshot.usage_pct,
                        "drive health sample"
                    );
                } else {
                    warn!(
                        drive = %snapshot.drive.display(),
                        status = snapshot.status.as_str(),
                        usage_pct = snapshot.usage_pct,
                        "drive usage threshold exceeded"
                    );
                }
                append_history(history, retention_period, snapshot.clone());
                notify(subscribers, &snapshot);
                out.push(snapshot);
            }
            Err(e) => {
                warn!(drive = %path.display(), error = %e, "drive health probe failed");
            }
        }
    }
    out
}

fn append_history(
    history: &RwLock<HashMap<PathBuf, VecDeque<HealthSnapshot>>>,
    retention_period: Duration,
    snapshot: HealthSnapshot,
) {
    let mut history = history.write();
    let ring = history.entry(snapshot.drive.clone()).or_default();
    ring.push_back(snapshot);

    let cutoff = SystemTime::now().checked_sub(retention_period);
    while let Some(front) = ring.front() {
        let too_old = cutoff.is_some_and(|c| front.sampled_at < c);
        if too_old || ring.len() > HISTORY_CAP {
            ring.pop_front();
        } else {
            break;
        }
    }
}

fn notify(subscribers: &SubscriberMap, snapshot: &HealthSnapshot) {
    let message = (snapshot.status != HealthStatus::Ok).then(|| {
        format!(
            "drive {} ({}) at {:.1}% usage",
            snapshot.drive.display(),
            snapshot.status.as_str(),
            snapshot.usage_pct
        )
    });

    let subscribers = subscribers.read();
    for (id, callback) in subscribers.iter() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            callback(snapshot, message.as_deref());
        }));
        if result.is_err() {
            warn!(subscriber = id, "health subscriber panicked");
        }
    }
}
