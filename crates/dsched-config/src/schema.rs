//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::placeholder::PlaceholderResolver;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Process-wide values that `${name}` placeholders resolve against.
    #[serde(default)]
    pub properties: HashMap<String, String>,

    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Config {
    /// Placeholder resolver over this configuration's `[properties]`.
    pub fn resolver(&self) -> PlaceholderResolver {
        PlaceholderResolver::new(self.properties.clone())
    }
}

/// Guard behaviour shared by every job of this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Stable identifier of this replica. A random UUID is used when unset.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Clock skew tolerated between replicas, in milliseconds.
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,

    /// Namespace prepended to the `lock-` and `jobInfo-` cache keys.
    #[serde(default)]
    pub key_prefix: String,
}

fn default_tolerance_ms() -> u64 {
    10
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            tolerance_ms: default_tolerance_ms(),
            key_prefix: String::new(),
        }
    }
}

/// Shared cache backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process cache. Only coordinates invocations within one process.
    #[default]
    Memory,
    /// Redis server shared by all replicas.
    Redis,
}

/// Shared cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Connection URL, used by the `redis` backend. May contain placeholders.
    #[serde(default = "default_cache_url")]
    pub url: String,
}

fn default_cache_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            url: default_cache_url(),
        }
    }
}

/// Trigger declaration of one job, before placeholder resolution.
///
/// Any combination of trigger kinds may be declared; at least one is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDeclaration {
    /// Six- or seven-field cron expression, seconds first.
    #[serde(default)]
    pub cron: Option<String>,

    /// IANA time zone for `cron`. Process-local zone when unset.
    #[serde(default)]
    pub zone: Option<String>,

    #[serde(default)]
    pub fixed_delay_ms: Option<u64>,

    /// Placeholder-capable form of `fixed_delay_ms`.
    #[serde(default)]
    pub fixed_delay_expression: Option<String>,

    #[serde(default)]
    pub fixed_rate_ms: Option<u64>,

    /// Placeholder-capable form of `fixed_rate_ms`.
    #[serde(default)]
    pub fixed_rate_expression: Option<String>,
}

impl ScheduleDeclaration {
    /// Whether any trigger kind is declared.
    pub fn has_trigger(&self) -> bool {
        has_text(&self.cron)
            || self.fixed_delay_ms.is_some()
            || has_text(&self.fixed_delay_expression)
            || self.fixed_rate_ms.is_some()
            || has_text(&self.fixed_rate_expression)
    }
}

pub(crate) fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Upper bound of `lock_expiry_seconds` (one year).
pub const MAX_LOCK_EXPIRY_SECONDS: u64 = 365 * 24 * 60 * 60;

/// A guarded job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Globally unique schedule key.
    pub key: String,

    /// Lifetime of the exclusivity lock, in seconds. At most
    /// [`MAX_LOCK_EXPIRY_SECONDS`].
    pub lock_expiry_seconds: u64,

    #[serde(flatten)]
    pub schedule: ScheduleDeclaration,

    /// Delay before the first local tick, in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Shell command forming the job body.
    #[serde(default)]
    pub command: Option<String>,
}
