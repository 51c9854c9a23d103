use std::env;
use std::path::{Path, PathBuf};

use parsergen_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = config
        .oracle
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    // Listed alongside the aliases the loader honors; the first set var wins
    // the attribution.
    let rows: Vec<(&str, String, &[&str])> = vec![
        ("oracle.provider", format!("{:?}", config.oracle.provider), &["PARSERGEN_ORACLE_PROVIDER"]),
        ("oracle.api_key", api_key, &["PARSERGEN_ORACLE_API_KEY"]),
        ("oracle.model", config.oracle.model.clone(), &["PARSERGEN_ORACLE_MODEL"]),
        ("oracle.timeout_secs", config.oracle.timeout_secs.to_string(), &["PARSERGEN_ORACLE_TIMEOUT_SECS"]),
        ("sandbox.runtime", config.sandbox.runtime.clone(), &["PARSERGEN_SANDBOX_RUNTIME"]),
        ("sandbox.image", config.sandbox.image.clone(), &["PARSERGEN_SANDBOX_IMAGE"]),
        ("sandbox.timeout_secs", config.sandbox.timeout_secs.to_string(), &["PARSERGEN_SANDBOX_TIMEOUT_SECS"]),
        ("sandbox.workspace_root", config.sandbox.workspace_root.display().to_string(), &["PARSERGEN_SANDBOX_WORKSPACE_ROOT"]),
        ("agent.max_attempts", config.agent.max_attempts.to_string(), &["PARSERGEN_AGENT_MAX_ATTEMPTS"]),
        ("agent.data_dir", config.agent.data_dir.display().to_string(), &["PARSERGEN_AGENT_DATA_DIR"]),
        ("agent.parser_dir", config.agent.parser_dir.display().to_string(), &["PARSERGEN_AGENT_PARSER_DIR"]),
        ("logging.level", config.logging.level.clone(), &["PARSERGEN_LOGGING_LEVEL", "PARSERGEN_LOG_LEVEL"]),
        ("logging.format", format!("{:?}", config.logging.format), &["PARSERGEN_LOGGING_FORMAT", "PARSERGEN_LOG_FORMAT"]),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_vars) in rows {
        let source =
            field_source(key, env_vars, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("{key} = {value}  [{source}]"));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("parsergen.toml"), PathBuf::from("config/parsergen.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = std::fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key: &str,
    env_vars: &[&str],
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    for var in env_vars {
        if env::var(var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env:{var}");
        }
    }

    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_has_key(doc, key) {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}

fn file_has_key(doc: &Value, dotted_key: &str) -> bool {
    let mut node = doc;
    for part in dotted_key.split('.') {
        match node.get(part) {
            Some(next) => node = next,
            None => return false,
        }
    }
    true
}

fn redact_secret(value: &str) -> String {
    if value.chars().count() <= 4 {
        return "****".to_string();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}****")
}
