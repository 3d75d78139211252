/// Constants module to avoid magic numbers in the codebase

// Executor
pub const MAX_REPAIR_ATTEMPTS: usize = 50;
pub const EXECUTE_START_TAG: &str = "<execute_python>";
pub const EXECUTE_END_TAG: &str = "</execute_python>";
pub const DATASET_BINDING: &str = "df";
pub const DEFAULT_PYTHON: &str = "python3";
pub const CODE_RUN_TIMEOUT_SECS: u64 = 120;
pub const ERROR_TAIL_LINES: usize = 12;

// Timeouts
pub const AGENT_CALL_TIMEOUT_SECS: u64 = 300;
pub const TOOL_CALL_TIMEOUT_SECS: u64 = 60;
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 600; // 10 minutes for large local models
pub const SESSION_SHUTDOWN_GRACE_MS: u64 = 500;

// Gateway
pub const DEFAULT_SERVER_CONFIG_PATH: &str = "mcp_config/server_config.json";
pub const DEFAULT_MAIL_TOOL: &str = "email_sender";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

// Pipeline
pub const DEFAULT_DATASET_PATH: &str = "dataset/coffee_sales.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "out_puts";
pub const GENERATE_STAGE_TAG: &str = "generate_chart";
pub const REFLECT_STAGE_TAG: &str = "reflect_chart";
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H%M%S";
pub const DEFAULT_INSTRUCTION: &str =
    "Create a plot comparing Q1 coffee sales in 2024 and 2025 using the data in coffee_sales.csv.";

// Model endpoints (OpenAI-compatible chat completions)
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

// Default Model Configuration
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: usize = 4096;

// Dataset date formats tried in order; two-digit years must come first
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%d.%m.%Y", "%Y/%m/%d"];
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
];
