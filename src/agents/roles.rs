use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::parser::{code_or_raw, merged_object, parse_structured};
use super::prompts;
use super::types::{AgentRole, CheckedCodeResult, ReflectResult};
use crate::executor::{RepairAgent, RepairRequest};
use crate::models::{ChatMessage, Model, ModelConfig};
use crate::utils::PipelineError;

/// One role bound to a model, with a deadline on every call
#[derive(Clone)]
pub struct Agent {
    role: AgentRole,
    model: Arc<dyn Model>,
    config: ModelConfig,
    timeout: Duration,
}

impl Agent {
    pub fn new(role: AgentRole, model: Arc<dyn Model>, config: ModelConfig, timeout: Duration) -> Self {
        Self {
            role,
            model,
            config,
            timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Send one prompt and return the raw response text
    pub async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let messages = [ChatMessage::user(prompt)];
        tracing::debug!(role = %self.role, model = self.model.name(), "calling agent");

        match tokio::time::timeout(self.timeout, self.model.chat(&messages, &self.config)).await {
            Ok(Ok(response)) => {
                if let Some(usage) = &response.usage {
                    tracing::debug!(role = %self.role, tokens = usage.total_tokens, "agent answered");
                }
                Ok(response.content)
            }
            Ok(Err(e)) => Err(PipelineError::Agent {
                role: self.role.to_string(),
                reason: format!("{:#}", e),
            }),
            Err(_) => Err(PipelineError::Timeout {
                what: format!("agent '{}'", self.role),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Send one prompt and parse the response as `T`
    pub async fn structured<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, PipelineError> {
        let response = self.complete(prompt).await?;
        parse_structured(&response).map_err(|reason| self.malformed(reason))
    }

    /// Send one prompt and return tagged code from its `python_code` field
    ///
    /// A response that skips the JSON and contains tagged code is accepted as is.
    pub async fn code(&self, prompt: &str) -> Result<String, PipelineError> {
        let response = self.complete(prompt).await?;
        let field = merged_object(&response)
            .and_then(|v| v.get("python_code").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| "missing 'python_code' field".to_string());
        code_or_raw(field, &response).map_err(|reason| self.malformed(reason))
    }

    /// Send the reflection prompt and parse the critique
    pub async fn reflect(&self, prompt: &str) -> Result<ReflectResult, PipelineError> {
        let response = self.complete(prompt).await?;
        let value = merged_object(&response).ok_or_else(|| self.malformed("no JSON object found"))?;
        let mut result: ReflectResult = serde_json::from_value(ReflectResult::normalize(value))
            .map_err(|e| self.malformed(e.to_string()))?;
        result.python_code = code_or_raw(Ok(result.python_code), &response)
            .map_err(|reason| self.malformed(reason))?;
        Ok(result)
    }

    fn malformed(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::MalformedOutput {
            role: self.role.to_string(),
            reason: reason.into(),
        }
    }
}

/// Repair agent backed by the repairer role
pub struct CodeRepairer {
    agent: Agent,
    schema: String,
}

impl CodeRepairer {
    pub fn new(agent: Agent, schema: impl Into<String>) -> Self {
        Self {
            agent,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl RepairAgent for CodeRepairer {
    async fn repair(&self, request: RepairRequest) -> Result<String, PipelineError> {
        let prompt = prompts::code_repair(&request.code, &request.error, &request.out_path, &self.schema);
        let response = self.agent.complete(&prompt).await?;

        let field = parse_structured::<CheckedCodeResult>(&response).map(|checked| {
            if !checked.diagnosis.is_empty() {
                tracing::info!(attempt = request.attempt, "diagnosis: {}", checked.diagnosis);
            }
            checked.python_code
        });
        code_or_raw(field, &response).map_err(|reason| self.agent.malformed(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelResponse;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    /// Replays canned responses and records prompts
    struct Scripted {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        prompts: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl Scripted {
        fn new(replies: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl Model for Scripted {
        async fn chat(&self, messages: &[ChatMessage], _config: &ModelConfig) -> anyhow::Result<ModelResponse> {
            self.prompts.lock().push(messages[0].content.clone());
            tokio::time::sleep(self.delay).await;
            let content = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))?;
            Ok(ModelResponse {
                content,
                usage: None,
                model_name: "scripted".to_string(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn is_local(&self) -> bool {
            true
        }
    }

    fn agent(role: AgentRole, model: Arc<Scripted>) -> Agent {
        Agent::new(role, model, ModelConfig::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_code_accepts_json_and_tags_it() {
        let model = Scripted::new(vec![Ok(r#"{"python_code": "print(1)"}"#.to_string())]);
        let code = agent(AgentRole::Generator, model).code("p").await.unwrap();
        assert_eq!(code, "<execute_python>\nprint(1)\n</execute_python>");
    }

    #[tokio::test]
    async fn test_code_rejects_prose() {
        let model = Scripted::new(vec![Ok("Sorry, no chart today.".to_string())]);
        let err = agent(AgentRole::Generator, model).code("p").await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput { .. }));
    }

    #[tokio::test]
    async fn test_model_error_becomes_agent_error() {
        let model = Scripted::new(vec![Err(anyhow::anyhow!("connection refused"))]);
        let err = agent(AgentRole::Critic, model).complete("p").await.unwrap_err();
        match err {
            PipelineError::Agent { role, reason } => {
                assert_eq!(role, "critic");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("Expected Agent error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let model = Arc::new(Scripted {
            replies: Mutex::new(VecDeque::from(vec![Ok("{}".to_string())])),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::from_secs(5),
        });
        let slow = Agent::new(AgentRole::Deliverer, model, ModelConfig::default(), Duration::from_millis(50));
        let err = slow.complete("p").await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_reflect_handles_nested_feedback() {
        let reply = r#"{"feedback": {"feedback": "Use a bar chart.", "python_code": "<execute_python>v2</execute_python>"}}"#;
        let model = Scripted::new(vec![Ok(reply.to_string())]);
        let result = agent(AgentRole::Critic, model).reflect("p").await.unwrap();
        assert_eq!(result.feedback, "Use a bar chart.");
        assert_eq!(result.python_code, "<execute_python>v2</execute_python>");
    }

    #[tokio::test]
    async fn test_repairer_builds_prompt_and_returns_code() {
        let model = Scripted::new(vec![Ok(
            r#"{"diagnosis": "plt was never imported", "python_code": "<execute_python>import matplotlib.pyplot as plt</execute_python>"}"#
                .to_string(),
        )]);
        let repairer = CodeRepairer::new(agent(AgentRole::Repairer, Arc::clone(&model)), "- price: number");

        let fixed = repairer
            .repair(RepairRequest {
                code: "plt.plot()".to_string(),
                error: "NameError: name 'plt' is not defined".to_string(),
                out_path: PathBuf::from("out_puts/x.png"),
                attempt: 1,
            })
            .await
            .unwrap();

        assert_eq!(fixed, "<execute_python>import matplotlib.pyplot as plt</execute_python>");
        let prompts = model.prompts.lock();
        assert!(prompts[0].contains("NameError"));
        assert!(prompts[0].contains("out_puts/x.png"));
        assert!(prompts[0].contains("- price: number"));
    }
}
