//! # dsched Config
//!
//! Configuration management for the dsched job guard: the TOML schema,
//! `${...}` placeholder resolution and validation.

mod error;
mod loader;
mod placeholder;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use placeholder::PlaceholderResolver;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
