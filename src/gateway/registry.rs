use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::protocol::{ResourceInfo, ToolInfo};
use super::session::ToolSession;
use crate::utils::GatewayError;

/// What to do when a server registers a name another server already owns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// The later server wins; the takeover is logged
    #[default]
    Overwrite,
    /// The later server's registration fails as a whole
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
}

/// A tool or resource together with the session that provides it
#[derive(Clone)]
pub struct CapabilityRecord {
    pub name: String,
    pub description: String,
    pub kind: CapabilityKind,
    /// Input schema for tools, `Value::Null` for resources
    pub input_schema: Value,
    /// Read address for resources
    pub uri: Option<String>,
    /// Server entry that owns the capability
    pub server: String,
    session: Arc<dyn ToolSession>,
}

impl std::fmt::Debug for CapabilityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRecord")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("server", &self.server)
            .finish()
    }
}

impl CapabilityRecord {
    pub(super) fn session(&self) -> Arc<dyn ToolSession> {
        Arc::clone(&self.session)
    }
}

/// Name → owning-session tables for tools and resources
///
/// Only the gateway mutates it, and only while connecting.
pub(super) struct CapabilityRegistry {
    tools: HashMap<String, CapabilityRecord>,
    resources: HashMap<String, CapabilityRecord>,
    policy: ConflictPolicy,
}

impl CapabilityRegistry {
    pub(super) fn new(policy: ConflictPolicy) -> Self {
        Self {
            tools: HashMap::new(),
            resources: HashMap::new(),
            policy,
        }
    }

    /// Register everything one server exposes
    ///
    /// Under [`ConflictPolicy::Reject`] nothing is registered if any name clashes.
    pub(super) fn register_server(
        &mut self,
        session: Arc<dyn ToolSession>,
        tools: Vec<ToolInfo>,
        resources: Vec<ResourceInfo>,
    ) -> Result<(), GatewayError> {
        let server = session.server_name().to_string();

        if self.policy == ConflictPolicy::Reject {
            let clash = tools
                .iter()
                .filter_map(|t| self.tools.get(&t.name))
                .chain(resources.iter().filter_map(|r| self.resources.get(&r.name)))
                .next();
            if let Some(existing) = clash {
                return Err(GatewayError::Conflict {
                    name: existing.name.clone(),
                    server,
                    existing: existing.server.clone(),
                });
            }
        }

        for tool in tools {
            let record = CapabilityRecord {
                name: tool.name.clone(),
                description: tool.description,
                kind: CapabilityKind::Tool,
                input_schema: tool.input_schema,
                uri: None,
                server: server.clone(),
                session: Arc::clone(&session),
            };
            if let Some(previous) = self.tools.insert(tool.name, record) {
                tracing::warn!(
                    tool = %previous.name,
                    "tool from '{}' replaced by '{}'",
                    previous.server,
                    server
                );
            }
        }

        for resource in resources {
            let record = CapabilityRecord {
                name: resource.name.clone(),
                description: resource.description,
                kind: CapabilityKind::Resource,
                input_schema: Value::Null,
                uri: Some(resource.uri),
                server: server.clone(),
                session: Arc::clone(&session),
            };
            if let Some(previous) = self.resources.insert(resource.name, record) {
                tracing::warn!(
                    resource = %previous.name,
                    "resource from '{}' replaced by '{}'",
                    previous.server,
                    server
                );
            }
        }

        Ok(())
    }

    pub(super) fn tool(&self, name: &str) -> Result<&CapabilityRecord, GatewayError> {
        self.tools
            .get(name)
            .ok_or_else(|| GatewayError::UnknownCapability(name.to_string()))
    }

    /// Look a resource up by name, then by URI
    pub(super) fn resource(&self, name: &str) -> Result<&CapabilityRecord, GatewayError> {
        self.resources
            .get(name)
            .or_else(|| {
                self.resources
                    .values()
                    .find(|r| r.uri.as_deref() == Some(name))
            })
            .ok_or_else(|| GatewayError::UnknownCapability(name.to_string()))
    }

    pub(super) fn tools(&self) -> Vec<CapabilityRecord> {
        sorted(self.tools.values())
    }

    pub(super) fn resources(&self) -> Vec<CapabilityRecord> {
        sorted(self.resources.values())
    }

    pub(super) fn clear(&mut self) {
        self.tools.clear();
        self.resources.clear();
    }
}

fn sorted<'a>(records: impl Iterator<Item = &'a CapabilityRecord>) -> Vec<CapabilityRecord> {
    let mut records: Vec<CapabilityRecord> = records.cloned().collect();
    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}
