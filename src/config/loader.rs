//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::WalletConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<WalletConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<WalletConfig, ConfigError> {
    let config: WalletConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config("[rate_limit]\ncapacity = 0\n").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Validation failed"));
        assert!(message.contains("rate_limit.capacity"));
        assert!(message.contains("providers"));
    }

    #[test]
    fn parse_errors_surface() {
        assert!(matches!(parse_config("providers = 5"), Err(ConfigError::Parse(_))));
    }
}
