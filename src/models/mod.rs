// Gateway module for models - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod catalog;
mod factory;
mod traits;
mod types;
mod unified;

// Public re-exports - the ONLY way to access model functionality
pub use catalog::{ModelId, Provider};
pub use factory::ModelFactory;
pub use traits::Model;
pub use types::{ChatMessage, MessageRole, ModelConfig, ModelResponse, TokenUsage};
pub use unified::UnifiedModel;
