//! Tool-server gateway.
//!
//! Launches the configured MCP servers, records which session provides each
//! tool and resource, and routes calls by name.

// Private submodules - not directly accessible from outside
mod config;
mod manager;
mod protocol;
mod registry;
mod session;

// Public re-exports - the ONLY way to access gateway functionality
pub use config::{ServerConfigFile, ServerSpec};
pub use manager::ToolGateway;
pub use protocol::{result_text, structured_result, ResourceInfo, ToolInfo};
pub use registry::{CapabilityKind, CapabilityRecord, ConflictPolicy};
pub use session::{SessionConnector, StdioConnector, StdioSession, ToolSession};
