//! `${name}` / `${name:default}` placeholder resolution.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").expect("placeholder pattern is valid")
    })
}

/// Resolves placeholders against the `[properties]` table, then the process
/// environment, then the inline default.
///
/// Resolved values are themselves resolved, so a property may refer to
/// another property.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderResolver {
    properties: HashMap<String, String>,
    use_env: bool,
}

impl PlaceholderResolver {
    /// Create a resolver over the given properties, falling back to env vars.
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self {
            properties,
            use_env: true,
        }
    }

    /// Do not consult environment variables.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Resolve every placeholder in `value`.
    pub fn resolve(&self, value: &str) -> Result<String, ConfigError> {
        let mut visiting = Vec::new();
        self.resolve_inner(value, &mut visiting)
    }

    /// Resolve an optional value, mapping blank strings to `None`.
    pub fn resolve_opt(&self, value: Option<&str>) -> Result<Option<String>, ConfigError> {
        match value {
            Some(v) if !v.trim().is_empty() => {
                let resolved = self.resolve(v)?;
                let trimmed = resolved.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            _ => Ok(None),
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned().or_else(|| {
            if self.use_env {
                std::env::var(name).ok()
            } else {
                None
            }
        })
    }

    fn resolve_inner(&self, value: &str, visiting: &mut Vec<String>) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(value.len());
        let mut last = 0;

        for cap in placeholder_pattern().captures_iter(value) {
            let Some(whole) = cap.get(0) else { continue };
            result.push_str(&value[last..whole.start()]);

            let name = cap[1].trim();
            let replacement = match self.lookup(name) {
                Some(raw) => {
                    if visiting.iter().any(|v| v == name) {
                        return Err(ConfigError::CircularPlaceholder(name.to_string()));
                    }
                    visiting.push(name.to_string());
                    let resolved = self.resolve_inner(&raw, visiting)?;
                    visiting.pop();
                    resolved
                }
                None => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => {
                        return Err(ConfigError::UnresolvedPlaceholder {
                            placeholder: name.to_string(),
                            value: value.to_string(),
                        });
                    }
                },
            };

            result.push_str(&replacement);
            last = whole.end();
        }

        result.push_str(&value[last..]);
        Ok(result)
    }
}
