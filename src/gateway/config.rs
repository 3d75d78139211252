use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::utils::GatewayError;

/// The tool-server list, in the `mcpServers` layout shared with other MCP hosts
///
/// Declaration order is preserved; servers are connected and registered in
/// that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(rename = "mcpServers", default)]
    pub servers: IndexMap<String, ServerSpec>,
}

/// How to launch one tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ServerConfigFile {
    /// Read and parse the server list; any failure is a `ConfigLoad` error
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let text = std::fs::read_to_string(path).map_err(|e| GatewayError::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|reason| GatewayError::ConfigLoad {
            path: path.display().to_string(),
            reason,
        })
    }

    fn parse(text: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if let Some((name, _)) = config
            .servers
            .iter()
            .find(|(_, spec)| spec.command.trim().is_empty())
        {
            return Err(format!("server '{}' has an empty command", name));
        }
        Ok(config)
    }
}
