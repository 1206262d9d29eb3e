//! # dsched Core
//!
//! Guards a periodic job that every replica of a service schedules on its
//! own, so that each tick runs the job body on at most one replica.
//!
//! ## Components
//!
//! - [`JobKeyRegistry`]: one method per schedule key within a process
//! - [`LockCoordinator`]: short-lived exclusivity token in the shared cache
//! - [`ExecutionHistoryStore`]: last [`ExecutionRecord`] per schedule key
//! - [`ScheduleEvaluator`]: re-derives from a [`ScheduleSpec`] whether a run is due
//! - [`JobGuard`]: runs the per-invocation workflow over the above
//!
//! ## Invocation workflow
//!
//! ```text
//! tick ─► register key ─► acquire lock ──denied──► skip
//!                              │
//!                              ▼
//!                       read history ─► due? ──no──► release ─► skip
//!                                         │
//!                                        yes
//!                                         ▼
//!         write running record ─► body ─► write final record ─► release
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use dsched_cache::MemoryCache;
//! use dsched_core::{GuardSettings, GuardedJob, JobError, JobGuard, JobMethod, ScheduleSpec};
//!
//! # async fn run() -> Result<(), dsched_core::GuardError> {
//! let guard = JobGuard::new(Arc::new(MemoryCache::new()), GuardSettings::default());
//! let job = GuardedJob::new(
//!     "nightly-report",
//!     JobMethod::new("ReportJobs", "nightly"),
//!     60,
//!     ScheduleSpec::default().with_fixed_rate(Duration::from_secs(3600)),
//! )?;
//!
//! let rows = guard
//!     .invoke_with_guard(&job, || async { Ok::<_, JobError>(42) })
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod evaluator;
pub mod guard;
pub mod history;
pub mod keys;
pub mod lock;
pub mod record;
pub mod registry;
pub mod schedule;

pub use error::{GuardError, GuardResult, JobError};
pub use evaluator::{ScheduleEvaluator, DEFAULT_TOLERANCE};
pub use guard::{GuardSettings, GuardedJob, JobGuard};
pub use history::ExecutionHistoryStore;
pub use keys::CacheKeys;
pub use lock::LockCoordinator;
pub use record::{ExecutionRecord, RESULT_SUCCESS, RESULT_UNKNOWN_ERROR};
pub use registry::{JobKeyRegistry, JobMethod};
pub use schedule::{CronTrigger, ScheduleError, ScheduleSpec};
