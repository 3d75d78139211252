use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::summary::{RunSummary, StageReport};
use crate::agents::{
    chart_generation, chart_reflection, email_delivery, Agent, AgentRole, CodeRepairer,
    DeliveryAction, DeliveryStatus, EmailBrief,
};
use crate::app::{Config, RoleSettings};
use crate::constants::{ARTIFACT_TIMESTAMP_FORMAT, GENERATE_STAGE_TAG, REFLECT_STAGE_TAG};
use crate::data::DataContext;
use crate::executor::{CodeRunner, PythonSandbox, SelfCorrectingExecutor};
use crate::gateway::{
    result_text, structured_result, ServerConfigFile, SessionConnector, StdioConnector, ToolGateway,
};
use crate::models::{Model, ModelConfig, ModelFactory};
use crate::utils::{log_debug, log_info, log_progress, ExecutionError, PipelineError};

const STAGE_COUNT: usize = 3;
const DEFAULT_SUBJECT: &str = "Chart report";

/// The agents of one pipeline, one per role
#[derive(Clone)]
pub struct AgentSet {
    pub generator: Agent,
    pub critic: Agent,
    pub repairer: Agent,
    pub deliverer: Agent,
}

impl AgentSet {
    /// Bind every role to the model named in its configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.pipeline.agent_timeout_secs);
        let build = |role: AgentRole, settings: &RoleSettings| -> Result<Agent> {
            let (model, model_config) = ModelFactory::for_role(settings, &config.providers)
                .with_context(|| format!("Failed to create model for {}", role))?;
            tracing::debug!(role = %role, model = model.name(), "bound role");
            Ok(Agent::new(role, model, model_config, timeout))
        };

        Ok(Self {
            generator: build(AgentRole::Generator, &config.roles.generator)?,
            critic: build(AgentRole::Critic, &config.roles.critic)?,
            repairer: build(AgentRole::Repairer, &config.roles.repairer)?,
            deliverer: build(AgentRole::Deliverer, &config.roles.deliverer)?,
        })
    }

    /// Bind every role to the same model
    pub fn with_model(model: Arc<dyn Model>, timeout: Duration) -> Self {
        let agent = |role| Agent::new(role, Arc::clone(&model), ModelConfig::default(), timeout);
        Self {
            generator: agent(AgentRole::Generator),
            critic: agent(AgentRole::Critic),
            repairer: agent(AgentRole::Repairer),
            deliverer: agent(AgentRole::Deliverer),
        }
    }
}

/// Output paths of one run
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub generate: PathBuf,
    pub reflect: PathBuf,
}

impl ArtifactPaths {
    /// `<dir>/<stage_tag>_<YYYY_MM_DD_HHMMSS>.png` for both stages
    pub fn at(output_dir: &Path, now: chrono::DateTime<chrono::Local>) -> Self {
        let stamp = now.format(ARTIFACT_TIMESTAMP_FORMAT).to_string();
        Self {
            generate: output_dir.join(format!("{}_{}.png", GENERATE_STAGE_TAG, stamp)),
            reflect: output_dir.join(format!("{}_{}.png", REFLECT_STAGE_TAG, stamp)),
        }
    }
}

/// Generate → reflect → deliver coordinator
pub struct ChartPipeline {
    config: Config,
    agents: AgentSet,
    runner: Arc<dyn CodeRunner>,
    connector: Arc<dyn SessionConnector>,
}

impl ChartPipeline {
    pub fn new(
        config: Config,
        agents: AgentSet,
        runner: Arc<dyn CodeRunner>,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        Self {
            config,
            agents,
            runner,
            connector,
        }
    }

    /// Wire real models, the Python sandbox and stdio tool servers
    pub fn from_config(config: Config) -> Result<Self> {
        let agents = AgentSet::from_config(&config)?;
        let runner = PythonSandbox::from_config(&config.executor)
            .context("Failed to prepare the Python sandbox")?;
        let connector = StdioConnector::new(Duration::from_secs(config.gateway.call_timeout_secs));
        Ok(Self::new(config, agents, Arc::new(runner), Arc::new(connector)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the pipeline once
    ///
    /// Never fails: a stage error ends the run and is recorded in the summary.
    /// The gateway is released exactly once whatever happens.
    pub async fn run(&self, instruction: &str) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(instruction, &self.config.pipeline.dataset);

        let gateway = ToolGateway::new(
            self.config.gateway.on_conflict,
            Duration::from_secs(self.config.gateway.call_timeout_secs),
        );

        let result = self.run_stages(instruction, &gateway, &mut summary).await;
        let released = gateway.cleanup().await;
        tracing::debug!("gateway released {} sessions", released);

        if let Err(e) = result {
            tracing::error!("run aborted: {}", e);
            summary.error = Some(e.to_string());
        }
        summary.duration_ms = started.elapsed().as_millis();
        summary
    }

    async fn run_stages(
        &self,
        instruction: &str,
        gateway: &ToolGateway,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let pipeline = &self.config.pipeline;

        let data = DataContext::load(&pipeline.dataset)?;
        summary.rows = data.len();
        log_info(
            "📊",
            format!("Loaded {} rows from {}", data.len(), data.source().display()),
        );
        log_debug(format!("dataset preview:\n{}", data.head(5)));
        let schema = data.schema_text();

        let output_dir = prepare_output_dir(&pipeline.output_dir).map_err(ExecutionError::from)?;
        let paths = ArtifactPaths::at(&output_dir, chrono::Local::now());

        let servers = ServerConfigFile::load(&self.config.gateway.server_config)?;
        summary.servers_connected = gateway
            .connect_all_with(&servers, self.connector.as_ref())
            .await;

        let executor = SelfCorrectingExecutor::new(
            Arc::clone(&self.runner),
            Arc::new(CodeRepairer::new(self.agents.repairer.clone(), schema.clone())),
            self.config.executor.max_attempts,
        );

        // Generate
        log_progress(1, STAGE_COUNT, "Generating chart code");
        let prompt = chart_generation(instruction, &paths.generate, &schema);
        let first_code = self.agents.generator.code(&prompt).await?;
        let outcome = executor.run(&first_code, &data, &paths.generate).await;
        let stage = StageReport::from_outcome(GENERATE_STAGE_TAG, &paths.generate, &outcome);
        let succeeded = stage.succeeded;
        summary.stages.push(stage);
        if !succeeded {
            return Err(exhausted(GENERATE_STAGE_TAG, outcome.attempts, outcome.last_error));
        }

        // Reflect on the attempt-0 code, not the repaired one
        log_progress(2, STAGE_COUNT, "Reflecting on the chart");
        let prompt = chart_reflection(instruction, &first_code, &paths.reflect, &schema);
        let critique = self.agents.critic.reflect(&prompt).await?;
        let outcome = executor.run(&critique.python_code, &data, &paths.reflect).await;
        let stage = StageReport::from_outcome(REFLECT_STAGE_TAG, &paths.reflect, &outcome);
        let succeeded = stage.succeeded;
        summary.stages.push(stage);
        summary.feedback = Some(critique.feedback.clone());
        if !succeeded {
            return Err(exhausted(REFLECT_STAGE_TAG, outcome.attempts, outcome.last_error));
        }

        // Deliver
        log_progress(3, STAGE_COUNT, "Delivering the report");
        let report = compose_report(&critique.feedback, &outcome.code);
        summary.report = Some(report.clone());
        let status = self.deliver(gateway, &report).await?;
        summary.delivery = Some(status);

        Ok(())
    }

    async fn deliver(&self, gateway: &ToolGateway, report: &str) -> Result<DeliveryStatus, PipelineError> {
        let mail_tool = &self.config.gateway.mail_tool;
        let pipeline = &self.config.pipeline;

        let record = gateway
            .tool(mail_tool)
            .ok_or_else(|| crate::utils::GatewayError::UnknownCapability(mail_tool.clone()))?;

        let brief = EmailBrief {
            report,
            recipients: &pipeline.recipients,
            sender: pipeline.sender.as_deref(),
            mail_tool,
            tool_schema: Some(&record.input_schema).filter(|s| !s.is_null()),
            language: &pipeline.report_language,
        };
        let action: DeliveryAction = self.agents.deliverer.structured(&email_delivery(&brief)).await?;

        if action.tool != *mail_tool {
            return Err(PipelineError::Delivery(format!(
                "deliverer chose tool '{}' instead of '{}'",
                action.tool, mail_tool
            )));
        }

        let arguments = mail_arguments(action.arguments, report, &pipeline.recipients);
        tracing::info!(tool = %mail_tool, server = %record.server, "sending report");
        let result = gateway.call_tool(mail_tool, Value::Object(arguments)).await?;

        let status = delivery_status(&result);
        if status.is_failure() {
            return Err(PipelineError::Delivery(
                status.message.unwrap_or_else(|| "mail tool reported failure".to_string()),
            ));
        }
        Ok(status)
    }
}

/// Create the output directory and return it as an absolute path
///
/// Generated code may run from another working directory, so the paths it
/// is told to save to must not depend on ours.
fn prepare_output_dir(dir: &Path) -> std::io::Result<PathBuf> {
    let dir = anchor(&std::env::current_dir()?, dir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn anchor(base: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}

/// Report sent to the deliverer: the critique followed by the improved code
pub fn compose_report(feedback: &str, code: &str) -> String {
    format!("feedback: {}\n\nPython code:\n{}", feedback.trim(), code.trim())
}

/// Final mail-tool arguments
///
/// The body falls back to the report, the subject to a fixed line, and
/// configured recipients replace whatever addresses the model chose. Without
/// configured recipients the tool's own default applies.
fn mail_arguments(mut arguments: Map<String, Value>, report: &str, recipients: &[String]) -> Map<String, Value> {
    let body_missing = arguments
        .get("body")
        .and_then(Value::as_str)
        .map_or(true, |b| b.trim().is_empty());
    if body_missing {
        arguments.insert("body".to_string(), Value::String(report.to_string()));
    }

    let subject_missing = arguments
        .get("subject")
        .and_then(Value::as_str)
        .map_or(true, |s| s.trim().is_empty());
    if subject_missing {
        arguments.insert("subject".to_string(), Value::String(DEFAULT_SUBJECT.to_string()));
    }

    if recipients.is_empty() {
        arguments.remove("to_emails");
    } else {
        arguments.insert(
            "to_emails".to_string(),
            Value::Array(recipients.iter().cloned().map(Value::String).collect()),
        );
    }
    arguments
}

/// Interpret a mail-tool result as `{status, message}`
fn delivery_status(result: &Value) -> DeliveryStatus {
    if let Some(status) = structured_result(result)
        .and_then(|v| serde_json::from_value::<DeliveryStatus>(v).ok())
    {
        return status;
    }

    let text = result_text(result).join("\n");
    let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
    DeliveryStatus {
        status: if is_error { "failure" } else { "success" }.to_string(),
        message: Some(text).filter(|t| !t.is_empty()),
    }
}

fn exhausted(stage: &str, attempts: usize, last_error: Option<String>) -> PipelineError {
    PipelineError::RepairExhausted {
        stage: stage.to_string(),
        attempts,
        last_error: last_error.unwrap_or_else(|| "unknown error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_relative_output_dir_is_anchored() {
        assert_eq!(
            anchor(Path::new("/srv/plotline"), Path::new("out_puts")),
            Path::new("/srv/plotline/out_puts")
        );
        assert_eq!(
            anchor(Path::new("/srv/plotline"), Path::new("/data/charts")),
            Path::new("/data/charts")
        );
    }

    #[test]
    fn test_prepare_output_dir_creates_absolute_dir() {
        let base = tempfile::TempDir::new().unwrap();
        let dir = prepare_output_dir(&base.path().join("nested/out_puts")).unwrap();
        assert!(dir.is_absolute());
        assert!(dir.is_dir());

        let relative = prepare_output_dir(Path::new("target/plotline-test-out")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("target/plotline-test-out"));
        let paths = ArtifactPaths::at(&relative, chrono::Local::now());
        assert!(paths.generate.is_absolute() && paths.reflect.is_absolute());
    }

    #[test]
    fn test_artifact_paths_share_timestamp() {
        let now = chrono::Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        let paths = ArtifactPaths::at(Path::new("out_puts"), now);
        assert_eq!(paths.generate, Path::new("out_puts/generate_chart_2025_03_07_090501.png"));
        assert_eq!(paths.reflect, Path::new("out_puts/reflect_chart_2025_03_07_090501.png"));
    }

    #[test]
    fn test_report_holds_feedback_and_code() {
        let report = compose_report(" Add a legend. ", "<execute_python>v2</execute_python>\n");
        assert_eq!(
            report,
            "feedback: Add a legend.\n\nPython code:\n<execute_python>v2</execute_python>"
        );
    }

    #[test]
    fn test_mail_arguments_fill_gaps_and_pin_recipients() {
        let args = json!({"subject": "", "to_emails": ["made-up@example.com"]});
        let Value::Object(args) = args else { unreachable!() };
        let recipients = vec!["team@example.com".to_string()];

        let filled = mail_arguments(args, "the report", &recipients);
        assert_eq!(
            Value::Object(filled),
            json!({
                "subject": "Chart report",
                "body": "the report",
                "to_emails": ["team@example.com"]
            })
        );
    }

    #[test]
    fn test_mail_arguments_drop_guessed_recipients() {
        let Value::Object(args) = json!({"body": "<p>hi</p>", "to_emails": ["x@y.z"]}) else {
            unreachable!()
        };
        let filled = mail_arguments(args, "report", &[]);
        assert!(!filled.contains_key("to_emails"));
        assert_eq!(filled["body"], "<p>hi</p>");
    }

    #[test]
    fn test_delivery_status_from_structured_and_text_results() {
        let structured = json!({"structuredContent": {"status": "failure", "message": "bad credentials"}});
        let status = delivery_status(&structured);
        assert!(status.is_failure());
        assert_eq!(status.message.as_deref(), Some("bad credentials"));

        let text = json!({"content": [{"type": "text", "text": "{\"status\": \"success\"}"}]});
        assert!(!delivery_status(&text).is_failure());

        let errored = json!({"isError": true, "content": [{"type": "text", "text": "smtp down"}]});
        let status = delivery_status(&errored);
        assert!(status.is_failure());
        assert_eq!(status.message.as_deref(), Some("smtp down"));
    }
}
