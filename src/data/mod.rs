// Gateway module for data - follows the Train Station Pattern
// All external access must go through this gateway

mod context;

pub use context::{DataContext, DERIVED_COLUMNS};
