//! Sessions with tool servers.
//!
//! A server runs as a child process speaking JSON-RPC 2.0 over
//! line-delimited stdio.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use super::config::ServerSpec;
use super::protocol::{
    ListResourcesResult, ListToolsResult, McpRequest, McpResponse, ResourceInfo, ToolInfo,
    METHOD_NOT_FOUND,
};
use crate::constants::SESSION_SHUTDOWN_GRACE_MS;
use crate::utils::GatewayError;

/// An open session with one tool server
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Name of the server entry this session was opened for
    fn server_name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, GatewayError>;

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, GatewayError>;

    /// Invoke a tool; the result is returned exactly as the server sent it
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, GatewayError>;

    /// Read a resource by URI
    async fn read_resource(&self, uri: &str) -> Result<Value, GatewayError>;

    /// Release the session; calling it again is a no-op
    async fn shutdown(&self) -> Result<(), GatewayError>;
}

/// Opens sessions for server entries
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Launch the server and complete the handshake
    async fn connect(
        &self,
        name: &str,
        spec: &ServerSpec,
    ) -> Result<Arc<dyn ToolSession>, GatewayError>;
}

/// Connector that spawns each server as a child process
pub struct StdioConnector {
    request_timeout: Duration,
}

impl StdioConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl SessionConnector for StdioConnector {
    async fn connect(
        &self,
        name: &str,
        spec: &ServerSpec,
    ) -> Result<Arc<dyn ToolSession>, GatewayError> {
        let session = StdioSession::spawn(name, spec, self.request_timeout)?;
        if let Err(e) = session.initialize().await {
            if let Err(close_err) = session.shutdown().await {
                tracing::debug!(server = %name, "shutdown after failed handshake: {}", close_err);
            }
            return Err(GatewayError::Connection {
                server: name.to_string(),
                reason: format!("handshake failed: {}", e),
            });
        }
        Ok(Arc::new(session))
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<McpResponse>>>>;

/// Session with a server running as a child process
pub struct StdioSession {
    name: String,
    next_id: AtomicU64,
    pending: PendingMap,
    tx: Mutex<Option<mpsc::Sender<String>>>,
    child: tokio::sync::Mutex<Option<Child>>,
    request_timeout: Duration,
}

impl std::fmt::Debug for StdioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioSession")
            .field("name", &self.name)
            .finish()
    }
}

impl StdioSession {
    /// Spawn the server process and start the stdio pump tasks
    pub fn spawn(
        name: &str,
        spec: &ServerSpec,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let connection_error = |reason: String| GatewayError::Connection {
            server: name.to_string(),
            reason,
        };

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|e| connection_error(format!("failed to spawn '{}': {}", spec.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| connection_error("stdin not available".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connection_error("stdout not available".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| connection_error("stderr not available".to_string()))?;

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Stdout reader: match responses to pending requests
        let pending_clone = Arc::clone(&pending);
        let server = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => dispatch_line(&server, &line, &pending_clone),
                    Ok(None) => {
                        tracing::debug!(server = %server, "stdout closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(server = %server, "error reading stdout: {}", e);
                        break;
                    }
                }
            }
            // Dropping the senders wakes every waiter with a closed channel
            pending_clone.lock().clear();
        });

        // Stderr reader: server logs
        let server = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(server = %server, "{}", line.trim_end());
            }
        });

        // Stdin writer: ends when the sender is dropped, closing stdin
        let server = name.to_string();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let written = async {
                    stdin.write_all(msg.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::warn!(server = %server, "failed to write to stdin: {}", e);
                    break;
                }
            }
        });

        Ok(Self {
            name: name.to_string(),
            next_id: AtomicU64::new(1),
            pending,
            tx: Mutex::new(Some(tx)),
            child: tokio::sync::Mutex::new(Some(child)),
            request_timeout,
        })
    }

    /// Perform the initialize handshake
    pub async fn initialize(&self) -> Result<Value, GatewayError> {
        let result = self
            .send(McpRequest::initialize(self.next_id()))
            .await?;
        self.notify(McpRequest::notification("notifications/initialized", None))
            .await?;
        Ok(result)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn sender(&self) -> Result<mpsc::Sender<String>, GatewayError> {
        self.tx
            .lock()
            .clone()
            .ok_or_else(|| GatewayError::Closed(self.name.clone()))
    }

    async fn notify(&self, request: McpRequest) -> Result<(), GatewayError> {
        let msg = serde_json::to_string(&request)
            .map_err(|e| GatewayError::Protocol(format!("failed to serialize request: {}", e)))?;
        self.sender()?
            .send(msg)
            .await
            .map_err(|_| GatewayError::Closed(self.name.clone()))
    }

    async fn send(&self, request: McpRequest) -> Result<Value, GatewayError> {
        let id = request
            .id
            .ok_or_else(|| GatewayError::Protocol("request without id".to_string()))?;
        let method = request.method.clone();

        let (resp_tx, resp_rx) = oneshot::channel();
        self.pending.lock().insert(id, resp_tx);

        if let Err(e) = self.notify(request).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, resp_rx).await {
            Ok(Ok(response)) => match response.error {
                Some(error) => Err(GatewayError::Server {
                    code: error.code,
                    message: error.message,
                }),
                None => Ok(response.result.unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(GatewayError::Closed(self.name.clone())),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(GatewayError::Timeout {
                    method,
                    secs: self.request_timeout.as_secs(),
                })
            }
        }
    }
}

/// Route one stdout line to the request waiting for it
fn dispatch_line(server: &str, line: &str, pending: &PendingMap) {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => {
            tracing::debug!(server = %server, "ignoring non-JSON output: {}", line);
            return;
        }
    };

    // Server-initiated requests and notifications carry a method
    if value.get("method").is_some() {
        tracing::debug!(server = %server, "ignoring server message: {}", line);
        return;
    }

    match serde_json::from_value::<McpResponse>(value) {
        Ok(response) => {
            if let Some(sender) = pending.lock().remove(&response.id) {
                let _ = sender.send(response);
            }
        }
        Err(e) => tracing::debug!(server = %server, "unrecognised response: {}", e),
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, GatewayError> {
        let result = self.send(McpRequest::list_tools(self.next_id())).await?;
        let listed: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| GatewayError::Protocol(format!("bad tools/list result: {}", e)))?;
        Ok(listed.tools)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, GatewayError> {
        match self.send(McpRequest::list_resources(self.next_id())).await {
            Ok(result) => {
                let listed: ListResourcesResult = serde_json::from_value(result).map_err(|e| {
                    GatewayError::Protocol(format!("bad resources/list result: {}", e))
                })?;
                Ok(listed.resources)
            }
            Err(GatewayError::Server { code, .. }) if code == METHOD_NOT_FOUND => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, GatewayError> {
        self.send(McpRequest::call_tool(self.next_id(), name, arguments))
            .await
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, GatewayError> {
        self.send(McpRequest::read_resource(self.next_id(), uri))
            .await
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        // Closing stdin asks a well-behaved server to exit
        self.tx.lock().take();

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        let grace = Duration::from_millis(SESSION_SHUTDOWN_GRACE_MS);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.name, "exited with {}", status);
            }
            _ => {
                tracing::debug!(server = %self.name, "killing after grace period");
                child.kill().await.map_err(|e| GatewayError::Connection {
                    server: self.name.clone(),
                    reason: format!("failed to kill server process: {}", e),
                })?;
            }
        }

        self.pending.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_connection_error() {
        let spec = ServerSpec {
            command: "/nonexistent/plotline-test-server".to_string(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
        };
        let err = StdioConnector::new(Duration::from_secs(1))
            .connect("ghost", &spec)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Connection { ref server, .. } if server == "ghost"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_server_times_out_and_shuts_down_once() {
        // Never answers, so every request runs into the deadline
        let spec = ServerSpec {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            env: HashMap::new(),
            cwd: None,
        };
        let session = StdioSession::spawn("sleeper", &spec, Duration::from_millis(200)).unwrap();
        let err = session.list_tools().await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));

        session.shutdown().await.unwrap();
        session.shutdown().await.unwrap();
        assert!(matches!(
            session.call_tool("x", Value::Null).await,
            Err(GatewayError::Closed(_))
        ));
    }

    #[test]
    fn test_dispatch_routes_by_id() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = oneshot::channel();
        pending.lock().insert(7, tx);

        dispatch_line("s", r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#, &pending);
        assert_eq!(pending.lock().len(), 1);

        dispatch_line("s", r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#, &pending);
        assert!(pending.lock().is_empty());
        let response = rx.try_recv().unwrap();
        assert_eq!(response.id, 7);
        assert!(response.result.is_some());
    }
}
