use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::config::ServerConfigFile;
use super::registry::{CapabilityRecord, CapabilityRegistry, ConflictPolicy};
use super::session::{SessionConnector, StdioConnector, ToolSession};
use crate::utils::GatewayError;

/// Connects to every configured tool server and routes calls by capability name
///
/// Sessions are released in reverse order of acquisition by [`ToolGateway::cleanup`].
pub struct ToolGateway {
    registry: RwLock<CapabilityRegistry>,
    sessions: Mutex<Vec<Arc<dyn ToolSession>>>,
    call_timeout: Duration,
}

impl ToolGateway {
    pub fn new(policy: ConflictPolicy, call_timeout: Duration) -> Self {
        Self {
            registry: RwLock::new(CapabilityRegistry::new(policy)),
            sessions: Mutex::new(Vec::new()),
            call_timeout,
        }
    }

    /// Launch every server listed in `config_path`
    ///
    /// Failing to read the file is fatal; a server that fails to start or
    /// answer is logged and skipped. Returns the number of connected servers.
    pub async fn connect_all(&self, config_path: &Path) -> Result<usize, GatewayError> {
        let config = ServerConfigFile::load(config_path)?;
        let connector = StdioConnector::new(self.call_timeout);
        Ok(self.connect_all_with(&config, &connector).await)
    }

    /// Connect the servers of an already parsed list through `connector`
    pub async fn connect_all_with(
        &self,
        config: &ServerConfigFile,
        connector: &dyn SessionConnector,
    ) -> usize {
        let mut connected = 0;

        for (name, spec) in &config.servers {
            match self.connect_one(name, spec, connector).await {
                Ok((tools, resources)) => {
                    connected += 1;
                    tracing::info!(
                        server = %name,
                        "connected with {} tools, {} resources",
                        tools,
                        resources
                    );
                }
                Err(e) => {
                    tracing::warn!(server = %name, "skipping server: {}", e);
                }
            }
        }

        connected
    }

    async fn connect_one(
        &self,
        name: &str,
        spec: &super::config::ServerSpec,
        connector: &dyn SessionConnector,
    ) -> Result<(usize, usize), GatewayError> {
        let session = connector.connect(name, spec).await?;

        let listed = async {
            let tools = session.list_tools().await?;
            let resources = session.list_resources().await?;
            Ok::<_, GatewayError>((tools, resources))
        }
        .await;

        let registered = listed.and_then(|(tools, resources)| {
            let counts = (tools.len(), resources.len());
            self.registry
                .write()
                .register_server(Arc::clone(&session), tools, resources)
                .map(|_| counts)
        });

        match registered {
            Ok(counts) => {
                self.sessions.lock().push(session);
                Ok(counts)
            }
            Err(e) => {
                if let Err(close_err) = session.shutdown().await {
                    tracing::debug!(server = %name, "shutdown after failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Invoke a tool on the server that owns it; the result is passed through untouched
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, GatewayError> {
        let session = self.registry.read().tool(name)?.session();
        tracing::debug!(tool = %name, server = %session.server_name(), "calling tool");

        tokio::time::timeout(self.call_timeout, session.call_tool(name, arguments))
            .await
            .map_err(|_| GatewayError::Timeout {
                method: format!("tools/call {}", name),
                secs: self.call_timeout.as_secs(),
            })?
    }

    /// Read a resource from the server that owns it
    pub async fn read_resource(&self, name: &str) -> Result<Value, GatewayError> {
        let (session, uri) = {
            let registry = self.registry.read();
            let record = registry.resource(name)?;
            let uri = record.uri.clone().unwrap_or_else(|| name.to_string());
            (record.session(), uri)
        };

        tokio::time::timeout(self.call_timeout, session.read_resource(&uri))
            .await
            .map_err(|_| GatewayError::Timeout {
                method: format!("resources/read {}", uri),
                secs: self.call_timeout.as_secs(),
            })?
    }

    /// Release every session, newest first; safe to call repeatedly
    pub async fn cleanup(&self) -> usize {
        let sessions = std::mem::take(&mut *self.sessions.lock());
        self.registry.write().clear();

        let released = sessions.len();
        for session in sessions.into_iter().rev() {
            if let Err(e) = session.shutdown().await {
                tracing::warn!(server = %session.server_name(), "shutdown failed: {}", e);
            }
        }
        if released > 0 {
            tracing::info!("released {} tool server sessions", released);
        }
        released
    }

    /// Registered tools, sorted by name
    pub fn tools(&self) -> Vec<CapabilityRecord> {
        self.registry.read().tools()
    }

    /// Registered resources, sorted by name
    pub fn resources(&self) -> Vec<CapabilityRecord> {
        self.registry.read().resources()
    }

    pub fn tool(&self, name: &str) -> Option<CapabilityRecord> {
        self.registry.read().tool(name).ok().cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
