use thiserror::Error;

/// Errors raised by the tool-server gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to load server configuration from {path}: {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("Failed to connect to server '{server}': {reason}")]
    Connection { server: String, reason: String },

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Capability '{name}' from server '{server}' is already provided by '{existing}'")]
    Conflict {
        name: String,
        server: String,
        existing: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Request '{method}' timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    #[error("Session '{0}' is closed")]
    Closed(String),
}

/// Errors raised while running a generated executable unit
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("{0}")]
    Failed(String),

    #[error("Execution timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Failed to start interpreter: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading the dataset
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Failed to read dataset {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Dataset {0} has no header row")]
    MissingHeader(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Agent '{role}' failed: {reason}")]
    Agent { role: String, reason: String },

    #[error("Agent '{role}' returned malformed output: {reason}")]
    MalformedOutput { role: String, reason: String },

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("Stage '{stage}' gave up after {attempts} attempts: {last_error}")]
    RepairExhausted {
        stage: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}
