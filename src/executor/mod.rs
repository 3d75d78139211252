// Gateway module for executor - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod extract;
mod repair;
mod sandbox;

// Public re-exports - the ONLY way to access executor functionality
pub use extract::{extract_executable, strip_code_fences, wrap_executable};
pub use repair::{RepairAgent, RepairOutcome, RepairRequest, SelfCorrectingExecutor};
pub use sandbox::{CodeRunner, PythonSandbox, RunReport};
