use std::path::Path;

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "INTAKE_CONFIG";

/// Loads a config file. Relative paths inside it resolve against the
/// file's own directory.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    load_config_from_str(&content, base)
}

pub fn load_config_from_str(content: &str, base: &Path) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: Config = serde_json::from_value(json_value)?;
    config.resolve_relative_to(base);

    validate_config(&config)?;

    Ok(config)
}

/// Uses `$INTAKE_CONFIG` when set, otherwise the default layout under the
/// current directory.
pub fn load_from_env() -> Result<Config, ConfigError> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => load_config(Path::new(&path)),
        _ => {
            let cwd = std::env::current_dir().map_err(|e| ConfigError::ReadFile {
                path: Path::new(".").to_path_buf(),
                source: e,
            })?;
            let config = Config::default_in(cwd);
            validate_config(&config)?;
            Ok(config)
        }
    }
}

impl Config {
    pub fn resolve_from_env() -> Result<Self, ConfigError> {
        load_from_env()
    }
}

/// Checks `json_value` against the embedded schema. Unknown keys are
/// rejected here, before any defaults are filled in.
fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "poll_interval_ms must be greater than 0".to_string(),
        });
    }
    if config.max_error_len == 0 {
        return Err(ConfigError::Validation {
            message: "max_error_len must be greater than 0".to_string(),
        });
    }
    if config.hash_chunk_size == 0 {
        return Err(ConfigError::Validation {
            message: "hash_chunk_size must be greater than 0".to_string(),
        });
    }

    let areas = [
        ("inbox", &config.inbox),
        ("outbox", &config.outbox),
        ("failed", &config.failed),
    ];
    for (i, (name_a, a)) in areas.iter().enumerate() {
        for (name_b, b) in &areas[i + 1..] {
            if a == b {
                return Err(ConfigError::Validation {
                    message: format!("{} and {} must be different directories", name_a, name_b),
                });
            }
        }
    }

    Ok(())
}
