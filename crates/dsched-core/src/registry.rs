//! Process-wide binding of schedule keys to job methods.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::GuardError;

/// Identity of the code a schedule key guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobMethod {
    type_name: String,
    method_name: String,
}

impl JobMethod {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

impl fmt::Display for JobMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_name, self.method_name)
    }
}

/// Enforces that each schedule key names exactly one job method.
///
/// Empty at process start and discarded at exit. The check and the insert run
/// under one mutex so two callers racing to bind a fresh key cannot both win.
#[derive(Debug, Default)]
pub struct JobKeyRegistry {
    methods: Mutex<HashMap<String, JobMethod>>,
}

impl JobKeyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `method`.
    ///
    /// Binding the same method again is a no-op.
    pub fn register(&self, key: &str, method: &JobMethod) -> Result<(), GuardError> {
        if key.is_empty() {
            return Err(GuardError::EmptyKey {
                method: method.clone(),
            });
        }

        let mut methods = self.methods.lock();
        match methods.get(key) {
            Some(existing) if existing == method => Ok(()),
            Some(existing) => Err(GuardError::DuplicateKey {
                key: key.to_string(),
                method: method.clone(),
                existing: existing.clone(),
            }),
            None => {
                methods.insert(key.to_string(), method.clone());
                debug!(schedule_key = key, %method, "Registered schedule key");
                Ok(())
            }
        }
    }

    /// Method bound to `key`, if any.
    pub fn get(&self, key: &str) -> Option<JobMethod> {
        self.methods.lock().get(key).cloned()
    }

    /// All registered keys.
    pub fn keys(&self) -> Vec<String> {
        self.methods.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.methods.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.lock().is_empty()
    }
}
