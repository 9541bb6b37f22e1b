use crate::cache::{CacheStore, LoadOutcome};
use crate::producer::{Producer, RefreshMode};
use crate::settle::{SettlePolicy, settle};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// What happened to the producer step of a refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProducerStatus {
    Succeeded,
    Failed(String),
    /// No producer configured, or the configured program is not on disk.
    Skipped,
}

/// Result of one refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Producer ran and the cache was reloaded from its output.
    Success { records: usize, elapsed: Duration },
    /// Producer failed; the cache was reloaded from the data file left by an
    /// earlier run.
    FallbackUsed {
        records: usize,
        elapsed: Duration,
        warning: String,
    },
    /// No producer available; the cache was reloaded from the existing file.
    ProducerSkipped { records: usize, elapsed: Duration },
    /// Producer failed and there is no data file to fall back to. The cache
    /// was not touched.
    ProducerFailedNoFallback { reason: String },
    /// The reload itself failed.
    ReloadFailed {
        reason: String,
        producer: ProducerStatus,
    },
}

impl RefreshOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RefreshOutcome::ProducerFailedNoFallback { .. } | RefreshOutcome::ReloadFailed { .. }
        )
    }

    /// Reloaded but not from freshly produced data.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            RefreshOutcome::FallbackUsed { .. } | RefreshOutcome::ProducerSkipped { .. }
        )
    }

    pub fn records(&self) -> Option<usize> {
        match self {
            RefreshOutcome::Success { records, .. }
            | RefreshOutcome::FallbackUsed { records, .. }
            | RefreshOutcome::ProducerSkipped { records, .. } => Some(*records),
            _ => None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            RefreshOutcome::Success { elapsed, .. }
            | RefreshOutcome::FallbackUsed { elapsed, .. }
            | RefreshOutcome::ProducerSkipped { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }

    /// Human-readable summary, also used as the error text of fatal outcomes.
    pub fn message(&self) -> String {
        match self {
            RefreshOutcome::Success { .. } => "Data refreshed successfully".to_string(),
            RefreshOutcome::FallbackUsed { .. } => {
                "Producer failed; data reloaded from existing file".to_string()
            }
            RefreshOutcome::ProducerSkipped { .. } => {
                "Data reloaded from existing file".to_string()
            }
            RefreshOutcome::ProducerFailedNoFallback { reason } => {
                format!("Producer failed and no data file exists: {reason}")
            }
            RefreshOutcome::ReloadFailed { reason, .. } => {
                format!("Reloading the data file failed: {reason}")
            }
        }
    }

    /// Where the reloaded data came from.
    pub fn source(&self) -> &'static str {
        match self {
            RefreshOutcome::Success { .. } => "producer",
            RefreshOutcome::FallbackUsed { .. } | RefreshOutcome::ProducerSkipped { .. } => {
                "existing data file"
            }
            RefreshOutcome::ProducerFailedNoFallback { .. } | RefreshOutcome::ReloadFailed { .. } => {
                "none"
            }
        }
    }
}

/// Runs the producer, waits for the file to settle and reloads the cache.
///
/// Refreshes are serialized: a second caller waits for the first to finish
/// and then performs its own refresh.
pub struct RefreshCoordinator {
    cache: Arc<CacheStore>,
    producer: Option<Producer>,
    settle: SettlePolicy,
    gate: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(cache: Arc<CacheStore>, producer: Option<Producer>, settle: SettlePolicy) -> Self {
        RefreshCoordinator {
            cache,
            producer,
            settle,
            gate: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn producer(&self) -> Option<&Producer> {
        self.producer.as_ref()
    }

    pub async fn refresh(&self, mode: RefreshMode) -> RefreshOutcome {
        let _in_flight = self.gate.lock().await;
        let started = Instant::now();

        let producer = match self.producer.as_ref().filter(|p| p.is_present()) {
            Some(producer) => match producer.run(mode).await {
                Ok(run) => {
                    info!("producer completed in {:?}", run.elapsed);
                    ProducerStatus::Succeeded
                }
                Err(e) => {
                    error!("producer failed: {e}");
                    if !self.cache.data_file_exists() {
                        return RefreshOutcome::ProducerFailedNoFallback {
                            reason: e.to_string(),
                        };
                    }
                    warn!("continuing with existing data file");
                    ProducerStatus::Failed(e.to_string())
                }
            },
            None => {
                warn!("producer not available, reloading existing data file only");
                ProducerStatus::Skipped
            }
        };

        settle(self.cache.path(), self.settle).await;

        let outcome = match (self.cache.load().await, producer) {
            (Ok(LoadOutcome::Loaded { records }), ProducerStatus::Succeeded) => {
                RefreshOutcome::Success {
                    records,
                    elapsed: started.elapsed(),
                }
            }
            (Ok(LoadOutcome::Loaded { records }), ProducerStatus::Failed(warning)) => {
                RefreshOutcome::FallbackUsed {
                    records,
                    elapsed: started.elapsed(),
                    warning,
                }
            }
            (Ok(LoadOutcome::Loaded { records }), ProducerStatus::Skipped) => {
                RefreshOutcome::ProducerSkipped {
                    records,
                    elapsed: started.elapsed(),
                }
            }
            (Ok(LoadOutcome::NoData), ProducerStatus::Skipped) => RefreshOutcome::ProducerSkipped {
                records: self.cache.record_count(),
                elapsed: started.elapsed(),
            },
            (Ok(LoadOutcome::NoData), ProducerStatus::Failed(reason)) => {
                RefreshOutcome::ProducerFailedNoFallback { reason }
            }
            (Ok(LoadOutcome::NoData), producer @ ProducerStatus::Succeeded) => {
                RefreshOutcome::ReloadFailed {
                    reason: format!(
                        "producer reported success but {} does not exist",
                        self.cache.path().display()
                    ),
                    producer,
                }
            }
            (Err(e), producer) => RefreshOutcome::ReloadFailed {
                reason: e.to_string(),
                producer,
            },
        };

        if outcome.is_fatal() {
            error!("refresh failed: {}", outcome.message());
        } else {
            info!(
                "refresh complete: {} records ({})",
                outcome.records().unwrap_or(0),
                outcome.source()
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::{TempDir, tempdir};

    const SAMPLE: &str = "Designer Name,Actual Hours\nAlice,10\nBob,20\n";

    fn quick_settle() -> SettlePolicy {
        SettlePolicy::Poll {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        }
    }

    struct Fixture {
        dir: TempDir,
        data: PathBuf,
        cache: Arc<CacheStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data.csv");
        let cache = Arc::new(CacheStore::new(&data));
        Fixture { dir, data, cache }
    }

    fn sh_producer(dir: &Path, body: &str) -> Producer {
        let path = dir.join("produce.sh");
        fs::write(&path, body).unwrap();
        Producer::new(path, Some("sh".into()), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn absent_producer_reloads_existing_file() {
        let f = fixture();
        fs::write(&f.data, SAMPLE).unwrap();
        let missing = Producer::new(f.dir.path().join("nope.sh"), None, Duration::from_secs(1));
        let coordinator = RefreshCoordinator::new(f.cache.clone(), Some(missing), quick_settle());

        let outcome = coordinator.refresh(RefreshMode::Manual).await;
        assert!(matches!(outcome, RefreshOutcome::ProducerSkipped { records: 2, .. }));
        assert!(outcome.is_degraded());

        let direct = CacheStore::new(&f.data);
        assert_eq!(direct.load().await.unwrap(), LoadOutcome::Loaded { records: 2 });
    }

    #[tokio::test]
    async fn unconfigured_producer_without_file_is_empty_degraded_success() {
        let f = fixture();
        let coordinator = RefreshCoordinator::new(f.cache.clone(), None, quick_settle());

        let outcome = coordinator.refresh(RefreshMode::Manual).await;
        assert_eq!(outcome.records(), Some(0));
        assert!(!outcome.is_fatal());
        assert!(f.cache.get().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn producer_success_reloads_fresh_data() {
        let f = fixture();
        fs::write(&f.data, SAMPLE).unwrap();
        let producer = sh_producer(
            f.dir.path(),
            "printf 'Designer Name,Actual Hours\\nA,1\\nB,2\\nC,3\\n' > data.csv\n",
        );
        let coordinator = RefreshCoordinator::new(f.cache.clone(), Some(producer), quick_settle());

        let outcome = coordinator.refresh(RefreshMode::Manual).await;
        assert!(matches!(outcome, RefreshOutcome::Success { records: 3, .. }));
        assert_eq!(outcome.source(), "producer");
        assert_eq!(f.cache.record_count(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn producer_failure_without_file_is_fatal_and_skips_reload() {
        let f = fixture();
        let producer = sh_producer(f.dir.path(), "exit 1\n");
        let coordinator = RefreshCoordinator::new(f.cache.clone(), Some(producer), quick_settle());

        let outcome = coordinator.refresh(RefreshMode::Manual).await;
        assert!(matches!(outcome, RefreshOutcome::ProducerFailedNoFallback { .. }));
        assert!(outcome.is_fatal());
        assert!(f.cache.get().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn producer_failure_falls_back_to_existing_file() {
        let f = fixture();
        fs::write(&f.data, SAMPLE).unwrap();
        let producer = sh_producer(f.dir.path(), "echo 'download failed' >&2\nexit 2\n");
        let coordinator = RefreshCoordinator::new(f.cache.clone(), Some(producer), quick_settle());

        match coordinator.refresh(RefreshMode::Manual).await {
            RefreshOutcome::FallbackUsed { records, warning, .. } => {
                assert_eq!(records, 2);
                assert!(warning.contains("download failed"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn malformed_output_after_success_is_reload_failure() {
        let f = fixture();
        fs::write(&f.data, SAMPLE).unwrap();
        f.cache.load().await.unwrap();
        let before = f.cache.get().unwrap();
        let producer = sh_producer(f.dir.path(), "printf 'a,b\\n1,2,3\\n' > data.csv\n");
        let coordinator = RefreshCoordinator::new(f.cache.clone(), Some(producer), quick_settle());

        let outcome = coordinator.refresh(RefreshMode::Manual).await;
        assert!(matches!(
            outcome,
            RefreshOutcome::ReloadFailed { producer: ProducerStatus::Succeeded, .. }
        ));
        let after = f.cache.get().unwrap();
        assert_eq!(after.loaded_at, before.loaded_at);
        assert_eq!(after.len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn producer_success_without_output_file_is_reload_failure() {
        let f = fixture();
        let producer = sh_producer(f.dir.path(), "exit 0\n");
        let coordinator = RefreshCoordinator::new(f.cache.clone(), Some(producer), quick_settle());

        let outcome = coordinator.refresh(RefreshMode::Manual).await;
        assert!(matches!(outcome, RefreshOutcome::ReloadFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn concurrent_refreshes_each_reload_a_whole_snapshot() {
        let f = fixture();
        // Each run appends one row, so the two runs produce different counts.
        let producer = sh_producer(
            f.dir.path(),
            "[ -f data.csv ] || printf 'Designer Name\\n' > data.csv\necho X >> data.csv\n",
        );
        let coordinator = RefreshCoordinator::new(f.cache.clone(), Some(producer), quick_settle());

        let (first, second) = tokio::join!(
            coordinator.refresh(RefreshMode::Manual),
            coordinator.refresh(RefreshMode::Manual)
        );
        let mut counts = vec![first.records().unwrap(), second.records().unwrap()];
        counts.sort();
        assert_eq!(counts, vec![1, 2]);

        let snapshot = f.cache.get().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.records.iter().all(|r| r.len() == snapshot.headers.len()));
    }
}
