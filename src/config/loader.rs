//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const SAMPLE: &str = r#"
[envelope]
timeout_secs = 45.0
expiry_secs = 90.0

[observability]
log_level = "debug"

[[apis]]
name = "openai"
timeout_secs = 120.0
rate_limit = false

  [apis.advanced]
  simulated_stream_enabled = true
  delay_seconds = 0.05
  chunk_size_bytes = 64
  apply_to = ["application/json", "text/plain"]
  req_body_subst_enabled = true
  subst_rules = [
    { name = "force-model", operation = "set", path = "model", value = "gpt-4o-mini" },
    { name = "drop-user", operation = "remove", path = "user" },
  ]

[[apis]]
name = "gemini"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.envelope.timeout_secs, 45.0);
        assert_eq!(config.envelope.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.apis.len(), 2);

        let openai = &config.apis[0];
        assert_eq!(openai.timeout_secs, Some(120.0));
        assert!(!openai.rate_limit);
        assert_eq!(openai.advanced.chunk_size_bytes, 64);
        assert_eq!(openai.advanced.subst_rules.len(), 2);
        assert_eq!(openai.advanced.subst_rules[0].get("value"), Some(&json!("gpt-4o-mini")));

        let gemini = &config.apis[1];
        assert!(gemini.rate_limit);
        assert!(!gemini.advanced.simulated_stream_enabled);
        assert_eq!(gemini.advanced.init_delay_seconds, 0.5);
    }

    #[test]
    fn test_parse_rejects_invalid_advanced() {
        let err = parse_config(
            r#"
[[apis]]
name = "openai"
  [apis.advanced]
  simulated_stream_enabled = true
  chunk_size_bytes = 0
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation error, got {}", other),
        }
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse_config("[envelope"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.apis[0].name, "openai");

        let missing = load_config(Path::new("/nonexistent/envelope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
