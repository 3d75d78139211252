// Gateway module for agents - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod parser;
mod prompts;
mod roles;
mod types;

// Public re-exports - the ONLY way to access agent functionality
pub use parser::{ensure_execute_tags, extract_json_objects, merged_object, parse_structured};
pub use prompts::{chart_generation, chart_reflection, code_repair, email_delivery, EmailBrief};
pub use roles::{Agent, CodeRepairer};
pub use types::{
    AgentRole, CheckedCodeResult, DeliveryAction, DeliveryStatus, PythonCodeResult, ReflectResult,
};
