use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    AGENT_CALL_TIMEOUT_SECS, ANTHROPIC_BASE_URL, CODE_RUN_TIMEOUT_SECS, DEEPSEEK_BASE_URL,
    DEFAULT_DATASET_PATH, DEFAULT_MAIL_TOOL, DEFAULT_MAX_TOKENS, DEFAULT_OUTPUT_DIR,
    DEFAULT_PYTHON, DEFAULT_SERVER_CONFIG_PATH, DEFAULT_TEMPERATURE, GEMINI_BASE_URL,
    MAX_REPAIR_ATTEMPTS, OLLAMA_BASE_URL, TOOL_CALL_TIMEOUT_SECS,
};
use crate::gateway::ConflictPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model binding per agent role
    #[serde(default)]
    pub roles: RolesConfig,

    /// Endpoint and credential settings per provider
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Tool-server gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Code executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Model settings for one agent role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSettings {
    /// Model identifier (see `plotline models`)
    pub model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl RoleSettings {
    fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    pub generator: RoleSettings,
    pub critic: RoleSettings,
    pub repairer: RoleSettings,
    pub deliverer: RoleSettings,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            generator: RoleSettings::with_model("qwen3-coder"),
            critic: RoleSettings::with_model("qwen3-coder"),
            repairer: RoleSettings::with_model("qwen3-coder"),
            deliverer: RoleSettings::with_model("qwen3"),
        }
    }
}

/// Connection settings for an OpenAI-compatible provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL of the chat completions API
    pub base_url: String,
    /// Environment variable containing the API key
    pub api_key_env: Option<String>,
}

impl ProviderSettings {
    fn new(base_url: &str, api_key_env: Option<&str>) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key_env: api_key_env.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub ollama: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub deepseek: ProviderSettings,
    pub gemini: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ollama: ProviderSettings::new(OLLAMA_BASE_URL, Some("OLLAMA_API_KEY")),
            anthropic: ProviderSettings::new(ANTHROPIC_BASE_URL, Some("ANTHROPIC_API_KEY")),
            deepseek: ProviderSettings::new(DEEPSEEK_BASE_URL, Some("DEEPSEEK_API_KEY")),
            gemini: ProviderSettings::new(GEMINI_BASE_URL, Some("GOOGLE_API_KEY")),
        }
    }
}

/// Tool-server gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// JSON file listing the tool servers to launch
    pub server_config: PathBuf,
    /// Deadline for each tool call or resource read
    pub call_timeout_secs: u64,
    /// What to do when two servers expose the same capability name
    pub on_conflict: ConflictPolicy,
    /// Name of the mail-send tool used by the delivery stage
    pub mail_tool: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_config: PathBuf::from(DEFAULT_SERVER_CONFIG_PATH),
            call_timeout_secs: TOOL_CALL_TIMEOUT_SECS,
            on_conflict: ConflictPolicy::Overwrite,
            mail_tool: DEFAULT_MAIL_TOOL.to_string(),
        }
    }
}

/// Code executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Python interpreter name or path
    pub python: String,
    /// Total attempts per repair session, the initial run included
    pub max_attempts: usize,
    /// Wall-clock limit for one run of generated code
    pub run_timeout_secs: u64,
    /// Working directory for generated code (defaults to the current directory)
    pub workdir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            python: DEFAULT_PYTHON.to_string(),
            max_attempts: MAX_REPAIR_ATTEMPTS,
            run_timeout_secs: CODE_RUN_TIMEOUT_SECS,
            workdir: None,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// CSV dataset bound into generated code
    pub dataset: PathBuf,
    /// Directory receiving chart artifacts
    pub output_dir: PathBuf,
    /// Deadline for each agent call
    pub agent_timeout_secs: u64,
    /// Report recipients; empty lets the mail tool pick its default
    pub recipients: Vec<String>,
    /// Sender address mentioned to the delivery agent
    pub sender: Option<String>,
    /// Language the delivery agent writes the e-mail in
    pub report_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from(DEFAULT_DATASET_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            agent_timeout_secs: AGENT_CALL_TIMEOUT_SECS,
            recipients: Vec::new(),
            sender: None,
            report_language: "English".to_string(),
        }
    }
}

/// Load configuration from multiple sources
///
/// An explicit file replaces the global and local config files; environment
/// variables (`PLOTLINE_` prefix, `__` for nesting) always apply last.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    } else {
        let global_config = get_config_dir()?.join("config.toml");
        let local_config = PathBuf::from(".plotline/config.toml");

        if global_config.exists() {
            figment = figment.merge(Toml::file(&global_config));
        }
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }
    }

    figment = figment.merge(Env::prefixed("PLOTLINE_").split("__"));

    figment
        .extract()
        .context("Failed to load configuration")
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "plotline") {
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.to_path_buf())
    } else {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        let config_dir = PathBuf::from(home).join(".config").join("plotline");
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file and an example tool-server list
pub fn init_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config_file = config_dir.join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
        println!("Created default configuration at: {}", config_file.display());
    }

    let server_config = PathBuf::from(DEFAULT_SERVER_CONFIG_PATH);
    if !server_config.exists() {
        if let Some(parent) = server_config.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let example = r#"{
  "mcpServers": {
    "email": {
      "command": "uv",
      "args": ["run", "mcp_server/email_server.py"]
    },
    "filesystem": {
      "command": "uv",
      "args": ["run", "mcp_server/filesystem_server.py"]
    }
  }
}
"#;
        std::fs::write(&server_config, example)?;
        println!("Created example server list at: {}", server_config.display());
    }

    Ok(())
}
