use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub sandbox: SandboxConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct SandboxConfig {
    /// Container runtime binary, e.g. `docker` or `podman`.
    pub runtime: String,
    pub image: String,
    pub timeout_secs: u64,
    /// Root for per-run scratch workspaces.
    pub workspace_root: PathBuf,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_attempts: u32,
    pub data_dir: PathBuf,
    pub parser_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleProvider {
    Gemini,
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub oracle_provider: Option<OracleProvider>,
    pub oracle_api_key: Option<String>,
    pub oracle_model: Option<String>,
    pub sandbox_runtime: Option<String>,
    pub sandbox_image: Option<String>,
    pub sandbox_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub data_dir: Option<PathBuf>,
    pub parser_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig {
                provider: OracleProvider::Gemini,
                api_key: None,
                base_url: None,
                model: "gemini-1.5-pro".to_string(),
                timeout_secs: 120,
                max_output_tokens: 8192,
            },
            sandbox: SandboxConfig {
                runtime: "docker".to_string(),
                image: "parser-agent".to_string(),
                timeout_secs: 60,
                workspace_root: PathBuf::from(".parsergen/scratch"),
            },
            agent: AgentConfig {
                max_attempts: 3,
                data_dir: PathBuf::from("data"),
                parser_dir: PathBuf::from("custom_parsers"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for OracleProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported oracle provider `{other}` (expected gemini|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parsergen.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(oracle) = patch.oracle {
            if let Some(provider) = oracle.provider {
                self.oracle.provider = provider;
            }
            if let Some(oracle_api_key_value) = oracle.api_key {
                self.oracle.api_key = Some(secret_value(oracle_api_key_value));
            }
            if let Some(base_url) = oracle.base_url {
                self.oracle.base_url = Some(base_url);
            }
            if let Some(model) = oracle.model {
                self.oracle.model = model;
            }
            if let Some(timeout_secs) = oracle.timeout_secs {
                self.oracle.timeout_secs = timeout_secs;
            }
            if let Some(max_output_tokens) = oracle.max_output_tokens {
                self.oracle.max_output_tokens = max_output_tokens;
            }
        }

        if let Some(sandbox) = patch.sandbox {
            if let Some(runtime) = sandbox.runtime {
                self.sandbox.runtime = runtime;
            }
            if let Some(image) = sandbox.image {
                self.sandbox.image = image;
            }
            if let Some(timeout_secs) = sandbox.timeout_secs {
                self.sandbox.timeout_secs = timeout_secs;
            }
            if let Some(workspace_root) = sandbox.workspace_root {
                self.sandbox.workspace_root = workspace_root;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_attempts) = agent.max_attempts {
                self.agent.max_attempts = max_attempts;
            }
            if let Some(data_dir) = agent.data_dir {
                self.agent.data_dir = data_dir;
            }
            if let Some(parser_dir) = agent.parser_dir {
                self.agent.parser_dir = parser_dir;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARSERGEN_ORACLE_PROVIDER") {
            self.oracle.provider = value.parse()?;
        }
        if let Some(value) = read_env("PARSERGEN_ORACLE_API_KEY") {
            self.oracle.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARSERGEN_ORACLE_BASE_URL") {
            self.oracle.base_url = Some(value);
        }
        if let Some(value) = read_env("PARSERGEN_ORACLE_MODEL") {
            self.oracle.model = value;
        }
        if let Some(value) = read_env("PARSERGEN_ORACLE_TIMEOUT_SECS") {
            self.oracle.timeout_secs = parse_u64("PARSERGEN_ORACLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARSERGEN_ORACLE_MAX_OUTPUT_TOKENS") {
            self.oracle.max_output_tokens =
                parse_u32("PARSERGEN_ORACLE_MAX_OUTPUT_TOKENS", &value)?;
        }

        if let Some(value) = read_env("PARSERGEN_SANDBOX_RUNTIME") {
            self.sandbox.runtime = value;
        }
        if let Some(value) = read_env("PARSERGEN_SANDBOX_IMAGE") {
            self.sandbox.image = value;
        }
        if let Some(value) = read_env("PARSERGEN_SANDBOX_TIMEOUT_SECS") {
            self.sandbox.timeout_secs = parse_u64("PARSERGEN_SANDBOX_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARSERGEN_SANDBOX_WORKSPACE_ROOT") {
            self.sandbox.workspace_root = PathBuf::from(value);
        }

        if let Some(value) = read_env("PARSERGEN_AGENT_MAX_ATTEMPTS") {
            self.agent.max_attempts = parse_u32("PARSERGEN_AGENT_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PARSERGEN_AGENT_DATA_DIR") {
            self.agent.data_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("PARSERGEN_AGENT_PARSER_DIR") {
            self.agent.parser_dir = PathBuf::from(value);
        }

        let log_level =
            read_env("PARSERGEN_LOGGING_LEVEL").or_else(|| read_env("PARSERGEN_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARSERGEN_LOGGING_FORMAT").or_else(|| read_env("PARSERGEN_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(provider) = overrides.oracle_provider {
            self.oracle.provider = provider;
        }
        if let Some(api_key) = overrides.oracle_api_key {
            self.oracle.api_key = Some(secret_value(api_key));
        }
        if let Some(model) = overrides.oracle_model {
            self.oracle.model = model;
        }
        if let Some(runtime) = overrides.sandbox_runtime {
            self.sandbox.runtime = runtime;
        }
        if let Some(image) = overrides.sandbox_image {
            self.sandbox.image = image;
        }
        if let Some(timeout_secs) = overrides.sandbox_timeout_secs {
            self.sandbox.timeout_secs = timeout_secs;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.agent.max_attempts = max_attempts;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.agent.data_dir = data_dir;
        }
        if let Some(parser_dir) = overrides.parser_dir {
            self.agent.parser_dir = parser_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_oracle(&self.oracle)?;
        validate_sandbox(&self.sandbox)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parsergen.toml"), PathBuf::from("config/parsergen.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_oracle(oracle: &OracleConfig) -> Result<(), ConfigError> {
    if oracle.timeout_secs == 0 || oracle.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "oracle.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if oracle.model.trim().is_empty() {
        return Err(ConfigError::Validation("oracle.model must not be empty".to_string()));
    }

    match oracle.provider {
        OracleProvider::Gemini | OracleProvider::OpenAi => {
            let missing = oracle
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "oracle.api_key is required for gemini/openai providers. Set PARSERGEN_ORACLE_API_KEY or [oracle] api_key".to_string(),
                ));
            }
        }
        OracleProvider::Ollama => {
            let missing =
                oracle.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "oracle.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_sandbox(sandbox: &SandboxConfig) -> Result<(), ConfigError> {
    if sandbox.runtime.trim().is_empty() {
        return Err(ConfigError::Validation("sandbox.runtime must not be empty".to_string()));
    }

    if sandbox.image.trim().is_empty() {
        return Err(ConfigError::Validation("sandbox.image must not be empty".to_string()));
    }

    if sandbox.timeout_secs == 0 || sandbox.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "sandbox.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_attempts == 0 || agent.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "agent.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    oracle: Option<OraclePatch>,
    sandbox: Option<SandboxPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct OraclePatch {
    provider: Option<OracleProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SandboxPatch {
    runtime: Option<String>,
    image: Option<String>,
    timeout_secs: Option<u64>,
    workspace_root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_attempts: Option<u32>,
    data_dir: Option<PathBuf>,
    parser_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
