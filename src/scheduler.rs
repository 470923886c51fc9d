use crate::config::AppConfig;
use crate::error::{Error, RepoError};
use crate::model::Snapshot;
use crate::repository::Repository;
use crate::scanner;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Persisted { records: usize },
    Failed,
    /// Another cycle was still running; this tick was dropped.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub ticks_dropped: u64,
}

impl SchedulerStats {
    fn record(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Persisted { .. } => {
                self.cycles += 1;
                self.succeeded += 1;
            }
            CycleOutcome::Failed => {
                self.cycles += 1;
                self.failed += 1;
            }
            CycleOutcome::Skipped => self.ticks_dropped += 1,
        }
    }
}

/// Clears the scanning flag when a cycle ends, even by unwinding.
struct ScanningGuard<'a>(&'a AtomicBool);

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Drives scan cycles: one immediately, then one per `interval`.
///
/// At most one cycle runs at a time. A tick that arrives while a cycle is
/// in flight is dropped rather than queued, and ticks whose deadline passed
/// during an overrunning cycle are skipped.
pub struct Scheduler<R: Repository> {
    repo: R,
    reporter_identity: String,
    target_dir: PathBuf,
    interval: Duration,
    scanning: AtomicBool,
}

impl<R: Repository> Scheduler<R> {
    /// Intervals shorter than one millisecond are raised to one millisecond.
    pub fn new(repo: R, reporter_identity: &str, target_dir: &Path, interval: Duration) -> Self {
        Scheduler {
            repo,
            reporter_identity: reporter_identity.to_string(),
            target_dir: target_dir.to_path_buf(),
            interval: interval.max(MIN_INTERVAL),
            scanning: AtomicBool::new(false),
        }
    }

    pub fn from_config(repo: R, config: &AppConfig) -> Self {
        Scheduler::new(
            repo,
            &config.reporter_identity,
            &config.target_dir,
            config.interval(),
        )
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn state(&self) -> SchedulerState {
        if self.scanning.load(Ordering::Acquire) {
            SchedulerState::Scanning
        } else {
            SchedulerState::Idle
        }
    }

    /// Run until a message arrives on `shutdown` or its sender is dropped.
    /// A cycle in progress when shutdown is requested is completed first.
    pub fn run(&self, shutdown: &Receiver<()>) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        info!(
            "Scanning {} every {:?} as '{}'",
            self.target_dir.display(),
            self.interval,
            self.reporter_identity
        );

        stats.record(self.tick());
        let mut next_tick = Instant::now().checked_add(self.interval);

        loop {
            if shutdown_requested(shutdown, next_tick) {
                info!("Shutdown requested, stopping scan loop");
                break;
            }

            stats.record(self.tick());

            let (following, dropped) = self.next_deadline(next_tick, Instant::now());
            next_tick = following;
            if dropped > 0 {
                warn!(
                    "Scan cycle overran the {:?} interval, dropped {} tick(s)",
                    self.interval, dropped
                );
                stats.ticks_dropped += dropped;
            }
        }

        info!(
            "Scan loop stopped after {} cycle(s): {} persisted, {} failed, {} tick(s) dropped",
            stats.cycles, stats.succeeded, stats.failed, stats.ticks_dropped
        );
        stats
    }

    /// First deadline after `previous` that lies beyond `now`, with the
    /// number of deadlines skipped on the way. `None` means the next deadline
    /// is past what `Instant` can represent.
    fn next_deadline(&self, previous: Option<Instant>, now: Instant) -> (Option<Instant>, u64) {
        let Some(next) = previous.and_then(|p| p.checked_add(self.interval)) else {
            return (None, 0);
        };
        if next > now {
            return (Some(next), 0);
        }

        let behind = now.duration_since(next).as_nanos();
        let interval = self.interval.as_nanos();
        let dropped = u64::try_from(behind / interval + 1).unwrap_or(u64::MAX);
        let following = u64::try_from(interval - behind % interval)
            .ok()
            .and_then(|nanos| now.checked_add(Duration::from_nanos(nanos)));
        (following, dropped)
    }

    /// Run one Extract → Build → Persist cycle. Errors are logged here and
    /// never propagate to the caller.
    pub fn tick(&self) -> CycleOutcome {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous scan cycle still running, dropping tick");
            return CycleOutcome::Skipped;
        }
        let _guard = ScanningGuard(&self.scanning);

        let captured_at = Utc::now();
        let started = Instant::now();
        match self.cycle(captured_at) {
            Ok(records) => {
                debug!(
                    "Persisted {} record(s) from {} in {:.3}s",
                    records,
                    self.target_dir.display(),
                    started.elapsed().as_secs_f64()
                );
                CycleOutcome::Persisted { records }
            }
            Err(err) => {
                self.log_failure(&err, captured_at);
                CycleOutcome::Failed
            }
        }
    }

    fn cycle(&self, captured_at: DateTime<Utc>) -> Result<usize, Error> {
        let records = scanner::extract(&self.target_dir)?;
        let snapshot =
            Snapshot::build_at(&self.reporter_identity, &self.target_dir, records, captured_at);
        self.repo.persist(&snapshot)?;
        Ok(snapshot.records.len())
    }

    fn log_failure(&self, err: &Error, captured_at: DateTime<Utc>) {
        let path = self.target_dir.display();
        let reporter = self.reporter_identity.as_str();
        let captured_at = captured_at.to_rfc3339();
        match err {
            Error::Repository(RepoError::ConnectionFailure(_)) => warn!(
                %path, %reporter, %captured_at,
                "Repository unreachable, retrying on next tick: {}", err
            ),
            Error::Repository(RepoError::SchemaViolation(_)) => error!(
                %path, %reporter, %captured_at,
                "Snapshot rejected by repository and dropped: {}", err
            ),
            _ => error!(
                %path, %reporter, %captured_at,
                "Scan cycle failed: {}", err
            ),
        }
    }
}

/// Wait until `deadline` (forever when `None`). True when a shutdown
/// message arrived or every sender is gone.
fn shutdown_requested(shutdown: &Receiver<()>, deadline: Option<Instant>) -> bool {
    let signal = match deadline {
        Some(deadline) => shutdown.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        None => shutdown.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };
    !matches!(signal, Err(RecvTimeoutError::Timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryLog;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_tick_persists_snapshot() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "hello").unwrap();

        let scheduler = Scheduler::new(
            MemoryLog::new(),
            "node-1",
            tmp.path(),
            Duration::from_secs(60),
        );
        assert_eq!(scheduler.tick(), CycleOutcome::Persisted { records: 1 });
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let stored = scheduler.repository().read(tmp.path()).unwrap();
        assert_eq!(stored.reporter_identity, "node-1");
        assert_eq!(stored.file_names(), vec!["a.txt"]);
    }

    #[test]
    fn test_missing_directory_fails_cycle_only() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("gone");

        let scheduler = Scheduler::new(MemoryLog::new(), "node-1", &missing, Duration::from_secs(60));
        assert_eq!(scheduler.tick(), CycleOutcome::Failed);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.repository().is_empty());

        fs::create_dir(&missing).unwrap();
        assert_eq!(scheduler.tick(), CycleOutcome::Persisted { records: 0 });
    }

    #[test]
    fn test_schema_violation_drops_snapshot() {
        let tmp = tempdir().unwrap();
        let scheduler = Scheduler::new(MemoryLog::new(), "", tmp.path(), Duration::from_secs(60));
        assert_eq!(scheduler.tick(), CycleOutcome::Failed);
        assert!(scheduler.repository().is_empty());
    }

    #[test]
    fn test_stats_record_outcomes() {
        let mut stats = SchedulerStats::default();
        stats.record(CycleOutcome::Persisted { records: 3 });
        stats.record(CycleOutcome::Failed);
        stats.record(CycleOutcome::Skipped);
        assert_eq!(
            stats,
            SchedulerStats {
                cycles: 2,
                succeeded: 1,
                failed: 1,
                ticks_dropped: 1,
            }
        );
    }

    #[test]
    fn test_next_deadline_skips_missed_ticks() {
        let tmp = tempdir().unwrap();
        let scheduler = Scheduler::new(
            MemoryLog::new(),
            "node-1",
            tmp.path(),
            Duration::from_millis(100),
        );
        let start = Instant::now();

        let (next, dropped) = scheduler.next_deadline(Some(start), start);
        assert_eq!(next, Some(start + Duration::from_millis(100)));
        assert_eq!(dropped, 0);

        // Cycle ended 250ms after the deadline at `start`.
        let now = start + Duration::from_millis(250);
        let (next, dropped) = scheduler.next_deadline(Some(start), now);
        assert_eq!(next, Some(start + Duration::from_millis(300)));
        assert_eq!(dropped, 2);

        assert_eq!(scheduler.next_deadline(None, now), (None, 0));
    }

    #[test]
    fn test_zero_interval_is_raised() {
        let tmp = tempdir().unwrap();
        let scheduler = Scheduler::new(MemoryLog::new(), "node-1", tmp.path(), Duration::ZERO);
        let start = Instant::now();
        let (next, _) = scheduler.next_deadline(Some(start), start);
        assert_eq!(next, Some(start + MIN_INTERVAL));
    }

    #[test]
    fn test_unrepresentable_deadline_waits_for_shutdown() {
        let tmp = tempdir().unwrap();
        let scheduler = Scheduler::new(MemoryLog::new(), "node-1", tmp.path(), Duration::MAX);
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel();
        shutdown_tx.send(()).unwrap();

        let stats = scheduler.run(&shutdown_rx);
        assert_eq!(stats.cycles, 1);
    }
}
