//! Launching the external dropout scorer.
//!
//! The scorer is an opaque process that rewrites the prediction fields of
//! `students` in the shared database and exits. It is run on a fixed interval
//! and on demand; a mutex keeps at most one instance alive at a time.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::PredictionConfig;

pub const SCORER_BINARY: &str = "predict_dropouts";

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("failed to launch scorer {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{detail}")]
    Failed { code: Option<i32>, detail: String },

    #[error("scorer did not finish within {0:?} and was killed")]
    TimedOut(Duration),
}

impl PredictionError {
    /// Human-readable failure reason: captured stderr where available.
    pub fn detail(&self) -> String {
        match self {
            PredictionError::Failed { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct ScorerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ScorerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves the configured program, falling back to the scorer binary
    /// installed alongside the running executable.
    pub fn from_config(config: &PredictionConfig) -> Self {
        let program = config.program.clone().unwrap_or_else(default_scorer_path);
        Self::new(program)
            .with_args(config.args.iter().cloned())
            .with_timeout(config.timeout_secs.map(Duration::from_secs))
    }
}

fn default_scorer_path() -> PathBuf {
    std::env::current_exe()
        .map(|exe| exe.with_file_name(SCORER_BINARY))
        .unwrap_or_else(|_| PathBuf::from(SCORER_BINARY))
}

pub struct PredictionRunner {
    command: ScorerCommand,
    in_flight: Mutex<()>,
}

impl PredictionRunner {
    pub fn new(command: ScorerCommand) -> Self {
        Self {
            command,
            in_flight: Mutex::new(()),
        }
    }

    pub fn command(&self) -> &ScorerCommand {
        &self.command
    }

    /// Runs the scorer to completion. Callers arriving while a run is in
    /// progress wait for it to finish and then start their own run.
    pub async fn run(&self) -> Result<RunReport, PredictionError> {
        let _guard = self.in_flight.lock().await;
        let started = Instant::now();

        tracing::info!(program = ?self.command.program, "running dropout scorer");

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output();
        let output = match self.command.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(?limit, "dropout scorer timed out");
                    return Err(PredictionError::TimedOut(limit));
                }
            },
            None => output.await,
        }
        .map_err(|source| PredictionError::Spawn {
            program: self.command.program.clone(),
            source,
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!("ML: {line}");
        }

        let duration = started.elapsed();
        if output.status.success() {
            tracing::info!(?duration, "dropout scorer finished");
            return Ok(RunReport { duration });
        }

        let code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if stderr.is_empty() {
            match code {
                Some(code) => format!("scorer exited with code {code}"),
                None => "scorer was terminated by a signal".to_string(),
            }
        } else {
            stderr
        };
        Err(PredictionError::Failed { code, detail })
    }

    /// Starts the fixed-interval refresh. The first run happens one interval
    /// after startup; failures are logged and the schedule continues.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.run().await {
                    Ok(report) => {
                        tracing::debug!(duration = ?report.duration, "periodic prediction refresh done")
                    }
                    Err(err) => tracing::warn!(error = %err, "periodic prediction refresh failed"),
                }
            }
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> ScorerCommand {
        ScorerCommand::new("sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let runner = PredictionRunner::new(shell("echo scored; exit 0"));
        assert!(runner.run().await.is_ok());
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let runner = PredictionRunner::new(shell("echo 'model file missing' >&2; exit 3"));
        match runner.run().await {
            Err(PredictionError::Failed { code, detail }) => {
                assert_eq!(code, Some(3));
                assert_eq!(detail, "model file missing");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_failure_reports_exit_code() {
        let runner = PredictionRunner::new(shell("exit 2"));
        let err = runner.run().await.unwrap_err();
        assert_eq!(err.detail(), "scorer exited with code 2");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = PredictionRunner::new(ScorerCommand::new("/nonexistent/scorer-binary"));
        assert!(matches!(
            runner.run().await,
            Err(PredictionError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn slow_scorer_is_killed_after_timeout() {
        let runner = PredictionRunner::new(
            shell("sleep 5").with_timeout(Some(Duration::from_millis(100))),
        );
        let started = Instant::now();
        assert!(matches!(
            runner.run().await,
            Err(PredictionError::TimedOut(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn concurrent_runs_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("running");
        let script = format!(
            "if [ -e '{0}' ]; then echo overlap >&2; exit 1; fi; \
             touch '{0}'; sleep 0.2; rm '{0}'",
            lock.display()
        );
        let runner = Arc::new(PredictionRunner::new(shell(&script)));

        let (a, b, c) = tokio::join!(runner.run(), runner.run(), runner.run());
        assert!(a.is_ok(), "{a:?}");
        assert!(b.is_ok(), "{b:?}");
        assert!(c.is_ok(), "{c:?}");
    }
}
