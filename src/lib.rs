pub mod agents;
pub mod app;
pub mod cli;
pub mod constants;
pub mod data;
pub mod executor;
pub mod gateway;
pub mod models;
pub mod runtime;
pub mod utils;

pub use app::{load_config, Config};
pub use data::DataContext;
pub use gateway::ToolGateway;
pub use models::{Model, ModelFactory};
pub use runtime::{ChartPipeline, RunSummary};
pub use utils::{ExecutionError, GatewayError, PipelineError};
