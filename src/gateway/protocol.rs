//! MCP protocol types.
//!
//! Only the handshake, listing, tool-call and resource-read methods are
//! modelled; call and read results are handed back as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::MCP_PROTOCOL_VERSION;

/// A tool advertised by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for input parameters.
    #[serde(rename = "inputSchema", alias = "input_schema", default)]
    pub input_schema: Value,
}

/// A resource advertised by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Resource URI, used when reading it.
    pub uri: String,
    /// Human-facing name, used as the registry key.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Request or notification sent to a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Method name.
    pub method: String,
    /// Request parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    /// Create a new request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a notification (no response expected).
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Create the initialize handshake request.
    pub fn initialize(id: u64) -> Self {
        Self::new(
            id,
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                }
            })),
        )
    }

    /// Create a tools/list request.
    pub fn list_tools(id: u64) -> Self {
        Self::new(id, "tools/list", Some(serde_json::json!({})))
    }

    /// Create a resources/list request.
    pub fn list_resources(id: u64) -> Self {
        Self::new(id, "resources/list", Some(serde_json::json!({})))
    }

    /// Create a tools/call request.
    pub fn call_tool(id: u64, name: &str, arguments: Value) -> Self {
        Self::new(
            id,
            "tools/call",
            Some(serde_json::json!({
                "name": name,
                "arguments": arguments
            })),
        )
    }

    /// Create a resources/read request.
    pub fn read_resource(id: u64, uri: &str) -> Self {
        Self::new(id, "resources/read", Some(serde_json::json!({ "uri": uri })))
    }
}

/// Response from a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: u64,
    /// Result (on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC "method not found", returned by servers without resources.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Result of listing tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
}

/// Result of listing resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    #[serde(default)]
    pub resources: Vec<ResourceInfo>,
}

/// Pull the text blocks out of a tools/call result.
///
/// FastMCP servers wrap a returned dict as a JSON string inside a text block,
/// newer ones also send `structuredContent`; both shapes are handled.
pub fn result_text(result: &Value) -> Vec<String> {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Best-effort structured payload of a tools/call result.
pub fn structured_result(result: &Value) -> Option<Value> {
    if let Some(structured) = result.get("structuredContent") {
        // FastMCP wraps non-object returns as {"result": ...}
        return Some(
            structured
                .get("result")
                .cloned()
                .unwrap_or_else(|| structured.clone()),
        );
    }
    result_text(result)
        .iter()
        .find_map(|text| serde_json::from_str::<Value>(text).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_has_no_id() {
        let note = McpRequest::notification("notifications/initialized", None);
        let text = serde_json::to_string(&note).unwrap();
        assert!(!text.contains("\"id\""));
        assert!(text.contains("notifications/initialized"));
    }

    #[test]
    fn test_tool_info_accepts_camel_case_schema() {
        let tools: ListToolsResult = serde_json::from_value(json!({
            "tools": [{
                "name": "email_sender",
                "description": "Send out an email",
                "inputSchema": {"type": "object", "properties": {"body": {"type": "string"}}}
            }]
        }))
        .unwrap();
        assert_eq!(tools.tools[0].name, "email_sender");
        assert_eq!(tools.tools[0].input_schema["type"], "object");
    }

    #[test]
    fn test_structured_result_from_text_block() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"status\": \"failure\", \"message\": \"auth\"}"}],
            "isError": false
        });
        let value = structured_result(&result).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["message"], "auth");
    }

    #[test]
    fn test_structured_result_prefers_structured_content() {
        let result = json!({
            "content": [{"type": "text", "text": "ignored"}],
            "structuredContent": {"status": "success"}
        });
        assert_eq!(structured_result(&result).unwrap()["status"], "success");
    }
}
