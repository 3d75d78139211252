use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::agents::DeliveryStatus;
use crate::cli::OutputFormat;
use crate::executor::RepairOutcome;
use crate::utils::log_warn;

/// What one execute-with-repair stage produced
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub artifact: PathBuf,
    /// Whether the chart file exists after the stage
    pub artifact_written: bool,
    pub succeeded: bool,
    pub attempts: usize,
    pub repair_calls: usize,
    pub last_error: Option<String>,
    /// Last code attempted
    pub code: String,
}

impl StageReport {
    pub fn from_outcome(stage: &str, artifact: &Path, outcome: &RepairOutcome) -> Self {
        let artifact_written = artifact.exists();
        if outcome.succeeded && !artifact_written {
            log_warn(
                "⚠️",
                format!("{}: code ran but did not write {}", stage, artifact.display()),
            );
        }
        Self {
            stage: stage.to_string(),
            artifact: artifact.to_path_buf(),
            artifact_written,
            succeeded: outcome.succeeded,
            attempts: outcome.attempts,
            repair_calls: outcome.repair_calls,
            last_error: outcome.last_error.clone(),
            code: outcome.code.clone(),
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub instruction: String,
    pub dataset: PathBuf,
    pub rows: usize,
    pub servers_connected: usize,
    pub stages: Vec<StageReport>,
    pub feedback: Option<String>,
    pub report: Option<String>,
    pub delivery: Option<DeliveryStatus>,
    /// Error that ended the run early
    pub error: Option<String>,
    pub duration_ms: u128,
}

impl RunSummary {
    pub fn new(instruction: &str, dataset: &Path) -> Self {
        Self {
            instruction: instruction.to_string(),
            dataset: dataset.to_path_buf(),
            rows: 0,
            servers_connected: 0,
            stages: Vec::new(),
            feedback: None,
            report: None,
            delivery: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Format the summary according to the output format
    pub fn format(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self).unwrap_or_else(|e| {
                format!("{{\"error\": \"Failed to serialize summary: {}\"}}", e)
            }),
            OutputFormat::Text => self.format_text(),
        }
    }

    fn format_text(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("{} {}\n", "Instruction:".bold(), self.instruction));
        output.push_str(&format!(
            "{} {} ({} rows), {} tool servers\n",
            "Dataset:".bold(),
            self.dataset.display(),
            self.rows,
            self.servers_connected
        ));

        if !self.stages.is_empty() {
            output.push_str("\n--- Stages ---\n");
            for stage in &self.stages {
                let status = if stage.succeeded { "OK".green() } else { "FAIL".red() };
                output.push_str(&format!(
                    "[{}] {} - {} attempt(s), {} repair(s) -> {}\n",
                    status,
                    stage.stage,
                    stage.attempts,
                    stage.repair_calls,
                    stage.artifact.display()
                ));
                if let Some(error) = stage.last_error.as_ref().filter(|_| !stage.succeeded) {
                    output.push_str(&format!("  {}\n", error));
                }
            }
        }

        if let Some(feedback) = &self.feedback {
            output.push_str(&format!("\n--- Feedback ---\n{}\n", feedback));
        }

        if let Some(delivery) = &self.delivery {
            output.push_str(&format!(
                "\n{} {}",
                "Delivery:".bold(),
                delivery.status
            ));
            if let Some(message) = &delivery.message {
                output.push_str(&format!(" ({})", message));
            }
            output.push('\n');
        }

        if let Some(error) = &self.error {
            output.push_str(&format!("\n{} {}\n", "Error:".red().bold(), error));
        }

        output.push_str(&format!("\nFinished in {}ms\n", self.duration_ms));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        let mut summary = RunSummary::new("plot", Path::new("coffee.csv"));
        summary.rows = 3;
        summary.stages.push(StageReport::from_outcome(
            "generate_chart",
            Path::new("/nonexistent/chart.png"),
            &RepairOutcome {
                code: "x".to_string(),
                succeeded: false,
                attempts: 50,
                repair_calls: 49,
                last_error: Some("KeyError: 'sales'".to_string()),
                repair_error: None,
                report: None,
            },
        ));
        summary.error = Some("Stage 'generate_chart' gave up".to_string());
        summary
    }

    #[test]
    fn test_json_summary() {
        let json: serde_json::Value =
            serde_json::from_str(&summary().format(OutputFormat::Json)).unwrap();
        assert_eq!(json["stages"][0]["attempts"], 50);
        assert_eq!(json["stages"][0]["artifact_written"], false);
        assert_eq!(json["rows"], 3);
    }

    #[test]
    fn test_text_summary_lists_failure() {
        colored::control::set_override(false);
        let text = summary().format(OutputFormat::Text);
        assert!(text.contains("[FAIL] generate_chart - 50 attempt(s), 49 repair(s)"));
        assert!(text.contains("KeyError: 'sales'"));
        assert!(text.contains("Error: Stage 'generate_chart' gave up"));
        assert!(!summary().succeeded());
    }
}
