use log::{debug, warn};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::time::{Instant, sleep};

/// How to wait for a freshly written data file before re-reading it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep for a fixed delay.
    Fixed(Duration),
    /// Sample size and modification time every `interval` until two
    /// consecutive samples agree, giving up after `timeout`.
    Poll { interval: Duration, timeout: Duration },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::Poll {
            interval: Duration::from_millis(250),
            timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileSample {
    len: u64,
    modified: Option<SystemTime>,
}

async fn sample(path: &Path) -> Option<FileSample> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    Some(FileSample {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

/// Wait according to `policy`. Returns whether the file was seen stable.
///
/// With the poll strategy a missing file returns immediately: there is
/// nothing to wait for and the reload will report it.
pub async fn settle(path: &Path, policy: SettlePolicy) -> bool {
    match policy {
        SettlePolicy::Fixed(delay) => {
            sleep(delay).await;
            true
        }
        SettlePolicy::Poll { interval, timeout } => {
            let deadline = Instant::now() + timeout;
            let Some(mut previous) = sample(path).await else {
                return false;
            };
            // Always take a second sample, even when the interval is longer
            // than the whole window.
            loop {
                sleep(interval).await;
                let Some(current) = sample(path).await else {
                    return false;
                };
                if current == previous {
                    debug!("data file {} is stable", path.display());
                    return true;
                }
                previous = current;
                if Instant::now() + interval > deadline {
                    warn!(
                        "data file {} still changing after {:?}, reloading anyway",
                        path.display(),
                        timeout
                    );
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn unchanged_file_settles_after_one_interval() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a\n1\n").unwrap();
        let policy = SettlePolicy::Poll {
            interval: Duration::from_millis(20),
            timeout: Duration::from_secs(2),
        };

        let started = std::time::Instant::now();
        assert!(settle(&path, policy).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn interval_longer_than_window_still_waits_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a\n1\n").unwrap();
        let policy = SettlePolicy::Poll {
            interval: Duration::from_millis(150),
            timeout: Duration::from_millis(50),
        };

        let started = std::time::Instant::now();
        assert!(settle(&path, policy).await);
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn missing_file_does_not_wait() {
        let dir = tempdir().unwrap();
        let policy = SettlePolicy::Poll {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        };
        let started = std::time::Instant::now();
        assert!(!settle(&dir.path().join("absent.csv"), policy).await);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn growing_file_gives_up_at_deadline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a\n").unwrap();
        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for i in 0..40 {
                let body = format!("a\n{}\n", "x".repeat(i + 2));
                tokio::fs::write(&writer_path, body).await.unwrap();
                sleep(Duration::from_millis(5)).await;
            }
        });
        let policy = SettlePolicy::Poll {
            interval: Duration::from_millis(15),
            timeout: Duration::from_millis(100),
        };

        assert!(!settle(&path, policy).await);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn fixed_delay_always_reports_settled() {
        let dir = tempdir().unwrap();
        assert!(settle(&dir.path().join("x"), SettlePolicy::Fixed(Duration::from_millis(1))).await);
    }
}
