//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Unresolvable placeholder '{placeholder}' in value \"{value}\"")]
    UnresolvedPlaceholder { placeholder: String, value: String },

    #[error("Circular placeholder reference: {0}")]
    CircularPlaceholder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
