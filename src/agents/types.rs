use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The four agent roles of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Writes the first chart code from the instruction
    Generator,
    /// Critiques the first chart and writes improved code
    Critic,
    /// Fixes code that failed to run
    Repairer,
    /// Turns the report into a mail-tool call
    Deliverer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Generator => "generator",
            AgentRole::Critic => "critic",
            AgentRole::Repairer => "repairer",
            AgentRole::Deliverer => "deliverer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart code from the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonCodeResult {
    pub python_code: String,
}

/// Fixed code from the repairer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckedCodeResult {
    /// Root cause and fix applied
    #[serde(default)]
    pub diagnosis: String,
    pub python_code: String,
}

/// Critique and improved chart code from the critic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectResult {
    pub feedback: String,
    pub python_code: String,
}

impl ReflectResult {
    /// Flatten the shapes critics actually emit into `{feedback, python_code}`
    ///
    /// Handles `{"feedback": {"feedback": "...", "python_code": "..."}}` and
    /// non-string feedback such as lists of remarks.
    pub(super) fn normalize(mut value: Value) -> Value {
        let Some(object) = value.as_object_mut() else {
            return value;
        };

        if let Some(Value::Object(inner)) = object.get("feedback").cloned() {
            let text = inner.get("feedback").cloned().unwrap_or(Value::Null);
            object.insert("feedback".to_string(), text);
            if !object.contains_key("python_code") {
                if let Some(code) = inner.get("python_code") {
                    object.insert("python_code".to_string(), code.clone());
                }
            }
        }

        match object.get("feedback") {
            Some(Value::String(_)) => {}
            Some(Value::Array(items)) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                object.insert("feedback".to_string(), Value::String(joined));
            }
            Some(Value::Null) | None => {
                object.insert("feedback".to_string(), Value::String(String::new()));
            }
            Some(other) => {
                let text = other.to_string();
                object.insert("feedback".to_string(), Value::String(text));
            }
        }

        value
    }
}

/// Tool invocation chosen by the deliverer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAction {
    pub tool: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Result reported by the mail-send tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl DeliveryStatus {
    pub fn is_failure(&self) -> bool {
        self.status.eq_ignore_ascii_case("failure")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_nested_feedback_is_flattened() {
        let value = json!({
            "feedback": {"feedback": "Legend overlaps the bars.", "python_code": "<execute_python>x</execute_python>"}
        });
        let result: ReflectResult = serde_json::from_value(ReflectResult::normalize(value)).unwrap();
        assert_eq!(
            result,
            ReflectResult {
                feedback: "Legend overlaps the bars.".to_string(),
                python_code: "<execute_python>x</execute_python>".to_string(),
            }
        );
    }

    #[test]
    fn test_list_feedback_is_joined() {
        let value = json!({"feedback": ["too dark", "no title"], "python_code": "x"});
        let result: ReflectResult = serde_json::from_value(ReflectResult::normalize(value)).unwrap();
        assert_eq!(result.feedback, "too dark\nno title");
    }

    #[test]
    fn test_delivery_failure_status() {
        let status: DeliveryStatus =
            serde_json::from_value(json!({"status": "failure", "message": "auth"})).unwrap();
        assert!(status.is_failure());
        let ok: DeliveryStatus = serde_json::from_value(json!({"status": "success"})).unwrap();
        assert!(!ok.is_failure());
    }
}
