use crate::error::ProducerError;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// How a refresh was triggered. Passed to the producer as a flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshMode {
    #[default]
    Manual,
}

impl RefreshMode {
    pub fn as_flag(self) -> &'static str {
        match self {
            RefreshMode::Manual => "--manual",
        }
    }
}

/// The external program that regenerates the data file.
#[derive(Clone, Debug)]
pub struct Producer {
    program: PathBuf,
    interpreter: Option<String>,
    timeout: Duration,
}

/// Captured output of a producer run that exited successfully.
#[derive(Clone, Debug)]
pub struct ProducerRun {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl Producer {
    pub fn new(program: impl Into<PathBuf>, interpreter: Option<String>, timeout: Duration) -> Self {
        Producer {
            program: program.into(),
            interpreter,
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the configured program exists on disk.
    pub fn is_present(&self) -> bool {
        self.program.is_file()
    }

    /// Run the producer once with the mode flag.
    ///
    /// The working directory is the directory containing the program. Output
    /// is captured and logged; it never influences the result, which depends
    /// only on the exit status and the timeout. A timed-out child is killed.
    pub async fn run(&self, mode: RefreshMode) -> Result<ProducerRun, ProducerError> {
        // The child runs in the program's own directory, so pass it an absolute path.
        let program = std::path::absolute(&self.program).unwrap_or_else(|_| self.program.clone());
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(&program);
                c
            }
            None => Command::new(&program),
        };
        command
            .arg(mode.as_flag())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = program.parent() {
            command.current_dir(dir);
        }

        info!("running producer {}", self.program.display());
        let started = Instant::now();
        let child = command.spawn().map_err(|source| ProducerError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ProducerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?,
            Err(_) => return Err(ProducerError::Timeout(self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stdout.trim().is_empty() {
            info!("producer output: {}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            warn!("producer warnings: {}", stderr.trim_end());
        }

        if !output.status.success() {
            return Err(ProducerError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ProducerRun {
            stdout,
            stderr,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("produce.sh");
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn successful_run_passes_flag_and_working_dir() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "echo \"$1\" > flag.txt\necho done\n");
        let producer = Producer::new(&program, Some("sh".into()), Duration::from_secs(10));

        let run = producer.run(RefreshMode::Manual).await.unwrap();
        assert_eq!(run.stdout.trim(), "done");
        let flag = fs::read_to_string(dir.path().join("flag.txt")).unwrap();
        assert_eq!(flag.trim(), "--manual");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "echo broken >&2\nexit 3\n");
        let producer = Producer::new(&program, Some("sh".into()), Duration::from_secs(10));

        match producer.run(RefreshMode::Manual).await {
            Err(ProducerError::Failed { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_producer_times_out() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "sleep 5\n");
        let producer = Producer::new(&program, Some("sh".into()), Duration::from_millis(200));

        let started = Instant::now();
        let err = producer.run(RefreshMode::Manual).await.unwrap_err();
        assert!(matches!(err, ProducerError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_spawn_error() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "exit 0\n");
        let producer = Producer::new(
            &program,
            Some("definitely-not-an-interpreter".into()),
            Duration::from_secs(1),
        );

        assert!(producer.is_present());
        let err = producer.run(RefreshMode::Manual).await.unwrap_err();
        assert!(matches!(err, ProducerError::Spawn { .. }));
    }
}
