use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::app::ExecutorConfig;
use crate::constants::{DATASET_BINDING, ERROR_TAIL_LINES};
use crate::data::DataContext;
use crate::utils::ExecutionError;

/// Output of one successful run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Runs one executable unit against the dataset
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str, data: &DataContext) -> Result<RunReport, ExecutionError>;
}

/// Host environment variables passed through to the interpreter
const PASSTHROUGH_ENV: &[&str] = &["PATH", "LANG", "LC_ALL", "SYSTEMROOT", "TMPDIR"];

/// Runs generated Python in a separate interpreter process
///
/// Each run gets a fresh CSV snapshot of the dataset, a cleared environment,
/// isolated mode (`-I`), a non-interactive plotting backend and a wall-clock
/// limit. The only name pre-bound in the code's namespace is the dataset.
pub struct PythonSandbox {
    python: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(python: PathBuf, workdir: PathBuf, timeout: Duration) -> Self {
        Self {
            python,
            workdir,
            timeout,
        }
    }

    /// Resolve the interpreter and working directory from configuration
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, ExecutionError> {
        let python = which::which(&config.python).map_err(|e| {
            ExecutionError::Spawn(format!("interpreter '{}' not found: {}", config.python, e))
        })?;
        let workdir = match &config.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(Self::new(
            python,
            workdir,
            Duration::from_secs(config.run_timeout_secs),
        ))
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    fn bootstrap() -> String {
        format!(
            r#"import sys
import pandas as pd
_frame = pd.read_csv(sys.argv[1])
if "date" in _frame.columns:
    _frame["date"] = pd.to_datetime(_frame["date"], errors="coerce")
_source = sys.stdin.read()
exec(compile(_source, "<generated>", "exec"), {{"__name__": "__generated__", "{binding}": _frame}})
"#,
            binding = DATASET_BINDING
        )
    }
}

#[async_trait]
impl CodeRunner for PythonSandbox {
    async fn run(&self, code: &str, data: &DataContext) -> Result<RunReport, ExecutionError> {
        let snapshot = data
            .snapshot()
            .map_err(|e| ExecutionError::Spawn(format!("failed to snapshot dataset: {}", e)))?;
        let mpl_config = tempfile::tempdir()?;

        let mut command = Command::new(&self.python);
        command
            .arg("-I")
            .arg("-c")
            .arg(Self::bootstrap())
            .arg(snapshot.path())
            .env_clear()
            .env("MPLBACKEND", "Agg")
            .env("MPLCONFIGDIR", mpl_config.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in PASSTHROUGH_ENV {
            if let Some(value) = std::env::var_os(key) {
                command.env(key, value);
            }
        }

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::Spawn(format!("{}: {}", self.python.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
            // Dropping stdin signals end of source
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ExecutionError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let tail = error_tail(&stderr);
            return Err(ExecutionError::Failed(if tail.is_empty() {
                format!("interpreter exited with {}", output.status)
            } else {
                tail
            }));
        }

        Ok(RunReport {
            stdout,
            stderr,
            duration: started.elapsed(),
        })
    }
}

/// Last lines of a traceback; the exception line is what the repair agent needs most
fn error_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}
