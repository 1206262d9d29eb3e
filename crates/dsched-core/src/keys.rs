//! Cache key layout.

/// Builds the namespaced cache keys of a schedule key.
#[derive(Debug, Clone, Default)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    /// Keys under `prefix`, e.g. `"svc."`. An empty prefix is allowed.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `<prefix>lock-<key>`
    pub fn lock(&self, schedule_key: &str) -> String {
        format!("{}lock-{}", self.prefix, schedule_key)
    }

    /// `<prefix>jobInfo-<key>`
    pub fn history(&self, schedule_key: &str) -> String {
        format!("{}jobInfo-{}", self.prefix, schedule_key)
    }
}
