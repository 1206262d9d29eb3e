//! Execution records persisted per schedule key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::registry::JobMethod;

/// Result code of a successful run.
pub const RESULT_SUCCESS: &str = "SUCCESS";

/// Result code of a failure that carries no application code.
pub const RESULT_UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// Snapshot of one guarded invocation.
///
/// Written with `running = true` and no `end_time` before the job body
/// starts, then replaced once the body returns. A record without both
/// timestamps means the owning replica died mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Instance that ran the job.
    pub instance_id: String,
    /// Type declaring the job method.
    pub job_type: String,
    /// Job method name.
    pub job_method: String,
    #[serde(default)]
    pub begin_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub running: bool,
    #[serde(default)]
    pub result_code: String,
    #[serde(default)]
    pub message: String,
}

impl ExecutionRecord {
    /// Record for an invocation that is about to run.
    pub fn started(instance_id: impl Into<String>, method: &JobMethod, begin: DateTime<Utc>) -> Self {
        Self {
            instance_id: instance_id.into(),
            job_type: method.type_name().to_string(),
            job_method: method.method_name().to_string(),
            begin_time: Some(begin),
            end_time: None,
            running: true,
            result_code: String::new(),
            message: String::new(),
        }
    }

    /// Mark the invocation finished with the given outcome.
    pub fn finish<T>(&mut self, end: DateTime<Utc>, outcome: &Result<T, JobError>) {
        self.end_time = Some(end);
        self.running = false;
        match outcome {
            Ok(_) => {
                self.result_code = RESULT_SUCCESS.to_string();
                self.message.clear();
            }
            Err(err) => {
                self.result_code = err.result_code().to_string();
                self.message = err.message();
            }
        }
    }

    /// Whether both timestamps are present.
    pub fn is_complete(&self) -> bool {
        self.begin_time.is_some() && self.end_time.is_some()
    }

    /// Whether the run finished with [`RESULT_SUCCESS`].
    pub fn succeeded(&self) -> bool {
        self.is_complete() && self.result_code == RESULT_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn method() -> JobMethod {
        JobMethod::new("Reports", "daily")
    }

    #[test]
    fn test_started_record() {
        let begin = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = ExecutionRecord::started("node-1", &method(), begin);

        assert!(record.running);
        assert_eq!(record.begin_time, Some(begin));
        assert!(record.end_time.is_none());
        assert!(!record.is_complete());
        assert_eq!(record.job_type, "Reports");
        assert_eq!(record.job_method, "daily");
    }

    #[test]
    fn test_finish_success() {
        let begin = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 5).unwrap();
        let mut record = ExecutionRecord::started("node-1", &method(), begin);
        record.finish(end, &Ok::<_, JobError>(()));

        assert!(!record.running);
        assert_eq!(record.end_time, Some(end));
        assert_eq!(record.result_code, RESULT_SUCCESS);
        assert!(record.succeeded());
    }

    #[test]
    fn test_finish_domain_failure() {
        let begin = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut record = ExecutionRecord::started("node-1", &method(), begin);
        record.finish(begin, &Err::<(), _>(JobError::domain("E1", "boom")));

        assert_eq!(record.result_code, "E1");
        assert_eq!(record.message, "boom");
        assert!(record.is_complete());
        assert!(!record.succeeded());
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let begin = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = ExecutionRecord::started("node-1", &method(), begin);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["instanceId"], "node-1");
        assert_eq!(json["running"], true);
        assert!(json["endTime"].is_null());

        let back: ExecutionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
