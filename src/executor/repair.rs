use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::extract::extract_executable;
use super::sandbox::{CodeRunner, RunReport};
use crate::data::DataContext;
use crate::utils::{ExecutionError, PipelineError};

/// What the repair agent is told about a failed attempt
#[derive(Debug, Clone)]
pub struct RepairRequest {
    /// Code payload of the failed attempt
    pub code: String,
    /// Stringified failure of that attempt
    pub error: String,
    /// Where the chart is expected to be written
    pub out_path: PathBuf,
    /// Index of the attempt the repaired code will run as
    pub attempt: usize,
}

/// Produces a corrected code payload for a failed attempt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepairAgent: Send + Sync {
    async fn repair(&self, request: RepairRequest) -> Result<String, PipelineError>;
}

/// How a repair session ended
///
/// `code` is the last payload attempted, whether or not it succeeded.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub code: String,
    pub succeeded: bool,
    /// Attempts made, the initial run included
    pub attempts: usize,
    pub repair_calls: usize,
    /// Error from the most recent execution of the code
    pub last_error: Option<String>,
    /// Failure of the most recent repair call, if it failed
    pub repair_error: Option<String>,
    pub report: Option<RunReport>,
}

/// Runs a code payload and, on failure, cycles it through the repair agent
/// until it succeeds or the attempt ceiling is reached
pub struct SelfCorrectingExecutor {
    runner: Arc<dyn CodeRunner>,
    repairer: Arc<dyn RepairAgent>,
    max_attempts: usize,
}

impl SelfCorrectingExecutor {
    pub fn new(
        runner: Arc<dyn CodeRunner>,
        repairer: Arc<dyn RepairAgent>,
        max_attempts: usize,
    ) -> Self {
        Self {
            runner,
            repairer,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run the executable region of `payload` once
    pub async fn execute(&self, payload: &str, data: &DataContext) -> Result<RunReport, ExecutionError> {
        let unit = extract_executable(payload).trim();
        self.runner.run(unit, data).await
    }

    /// Run `payload`, repairing it after each failure
    ///
    /// Never returns an error: exhaustion is reported through
    /// [`RepairOutcome::succeeded`].
    pub async fn run(&self, payload: &str, data: &DataContext, out_path: &Path) -> RepairOutcome {
        let mut code = payload.to_string();
        let mut last_error: Option<String> = None;
        let mut repair_error: Option<String> = None;
        let mut repair_calls = 0;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                repair_calls += 1;
                let request = RepairRequest {
                    code: code.clone(),
                    error: last_error.clone().unwrap_or_default(),
                    out_path: out_path.to_path_buf(),
                    attempt,
                };
                match self.repairer.repair(request).await {
                    Ok(fixed) => {
                        code = fixed;
                        repair_error = None;
                    }
                    Err(e) => {
                        // The code did not run again, so its error still stands
                        tracing::warn!(attempt, "repair agent failed: {}", e);
                        repair_error = Some(e.to_string());
                        continue;
                    }
                }
            }

            match self.execute(&code, data).await {
                Ok(report) => {
                    tracing::info!(attempt, "code ran successfully");
                    return RepairOutcome {
                        code,
                        succeeded: true,
                        attempts: attempt + 1,
                        repair_calls,
                        last_error,
                        repair_error,
                        report: Some(report),
                    };
                }
                Err(e) => {
                    tracing::warn!(attempt, "code failed: {}", last_line(&e.to_string()));
                    last_error = Some(e.to_string());
                }
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            "giving up, code still failing"
        );
        RepairOutcome {
            code,
            succeeded: false,
            attempts: self.max_attempts,
            repair_calls,
            last_error,
            repair_error,
            report: None,
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_REPAIR_ATTEMPTS;
    use crate::executor::sandbox::MockCodeRunner;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dataset() -> DataContext {
        DataContext::from_reader(Path::new("t.csv"), "price\n1\n".as_bytes()).unwrap()
    }

    fn executor(runner: MockCodeRunner, repairer: MockRepairAgent) -> SelfCorrectingExecutor {
        SelfCorrectingExecutor::new(Arc::new(runner), Arc::new(repairer), MAX_REPAIR_ATTEMPTS)
    }

    #[tokio::test]
    async fn test_first_try_success_never_repairs() {
        let mut runner = MockCodeRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| Ok(RunReport::default()));
        let mut repairer = MockRepairAgent::new();
        repairer.expect_repair().never();

        let outcome = executor(runner, repairer)
            .run("<execute_python>print(1)</execute_python>", &dataset(), Path::new("out.png"))
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.repair_calls, 0);
        assert!(outcome.last_error.is_none());
    }

    #[tokio::test]
    async fn test_runner_receives_extracted_unit() {
        let mut runner = MockCodeRunner::new();
        runner
            .expect_run()
            .withf(|code, _| code == "print(df.shape)")
            .times(1)
            .returning(|_, _| Ok(RunReport::default()));
        let repairer = MockRepairAgent::new();

        let outcome = executor(runner, repairer)
            .run(
                "<execute_python>\n  print(df.shape)\n</execute_python>",
                &dataset(),
                Path::new("out.png"),
            )
            .await;
        assert!(outcome.succeeded);
    }

    #[tokio::test]
    async fn test_always_failing_code_stops_at_ceiling() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = Arc::clone(&runs);
        let mut runner = MockCodeRunner::new();
        runner.expect_run().returning(move |_, _| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            Err(ExecutionError::Failed("NameError: name 'plt' is not defined".to_string()))
        });
        let mut repairer = MockRepairAgent::new();
        repairer
            .expect_repair()
            .returning(|req| Ok(format!("# attempt {}\nplt.plot()", req.attempt)));

        let outcome = executor(runner, repairer)
            .run("plt.plot()", &dataset(), Path::new("out.png"))
            .await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, 50);
        assert_eq!(runs.load(Ordering::SeqCst), 50);
        assert_eq!(outcome.repair_calls, 49);
        assert_eq!(outcome.code, "# attempt 49\nplt.plot()");
        assert!(outcome.last_error.unwrap().contains("NameError"));
    }

    #[tokio::test]
    async fn test_repair_gets_previous_code_error_and_path() {
        let mut runner = MockCodeRunner::new();
        runner.expect_run().returning(|code, _| {
            if code.contains("import matplotlib") {
                Ok(RunReport::default())
            } else {
                Err(ExecutionError::Failed("NameError: plt".to_string()))
            }
        });
        let mut repairer = MockRepairAgent::new();
        repairer
            .expect_repair()
            .withf(|req| {
                req.code == "plt.plot()"
                    && req.error.contains("NameError")
                    && req.out_path == Path::new("out_puts/generate_chart.png")
                    && req.attempt == 1
            })
            .times(1)
            .returning(|_| Ok("import matplotlib.pyplot as plt\nplt.plot()".to_string()));

        let outcome = executor(runner, repairer)
            .run("plt.plot()", &dataset(), Path::new("out_puts/generate_chart.png"))
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.repair_calls, 1);
        assert!(outcome.code.starts_with("import matplotlib"));
    }

    #[tokio::test]
    async fn test_repair_agent_failure_consumes_an_attempt() {
        let mut runner = MockCodeRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| Err(ExecutionError::Timeout { secs: 1 }));
        let mut repairer = MockRepairAgent::new();
        repairer.expect_repair().times(2).returning(|_| {
            Err(PipelineError::Timeout {
                what: "repairer".to_string(),
                secs: 1,
            })
        });

        let outcome = SelfCorrectingExecutor::new(Arc::new(runner), Arc::new(repairer), 3)
            .run("loop()", &dataset(), Path::new("out.png"))
            .await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.code, "loop()");
        assert!(outcome.last_error.unwrap().contains("timed out"));
        assert!(outcome.repair_error.unwrap().contains("repairer"));
    }

    #[tokio::test]
    async fn test_repair_after_agent_timeout_still_sees_execution_error() {
        let mut runner = MockCodeRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Err(ExecutionError::Failed("KeyError: 'sales'".to_string())));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let calls = AtomicUsize::new(0);
        let mut repairer = MockRepairAgent::new();
        repairer.expect_repair().returning(move |req| {
            seen_clone.lock().push(req.error.clone());
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PipelineError::Timeout {
                    what: "agent 'repairer'".to_string(),
                    secs: 300,
                })
            } else {
                Ok(req.code)
            }
        });

        let outcome = SelfCorrectingExecutor::new(Arc::new(runner), Arc::new(repairer), 4)
            .run("df['sales'].plot()", &dataset(), Path::new("out.png"))
            .await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.repair_calls, 3);
        assert!(seen.lock().iter().all(|error| error == "KeyError: 'sales'"));
        assert_eq!(outcome.last_error.as_deref(), Some("KeyError: 'sales'"));
        assert!(outcome.repair_error.is_none());
    }
}
