//! Flow health evaluation -- runtime statistics, threshold policy, and
//! batch aggregation over scheduled flows.

pub mod batch;
pub mod evaluator;
pub mod format;
pub mod policy;
pub mod source;
pub mod stats;

pub use self::batch::{check, collect_snapshots, evaluate_all, BatchReport};
pub use self::evaluator::{evaluate, FlowHealthRecord, FlowSnapshot};
pub use self::policy::{classify, Verdict};
pub use self::stats::RuntimeStatistics;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default number of past successful runs considered.
pub const DEFAULT_HISTORY_LIMIT: u32 = 30;

/// Default slack on top of the historical maximum, as a fraction of the average.
pub const DEFAULT_TOLERANCE_FRACTION: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum HealthError {
    #[error("history limit must be a positive integer, got {0}")]
    InvalidHistoryLimit(i64),

    #[error("tolerance fraction must be a finite non-negative number, got {0}")]
    InvalidTolerance(f64),

    #[error("unknown execution status '{0}'")]
    UnknownStatus(String),
}

/// Execution status, ordered by ascending severity.
///
/// Everything up to and including `Succeeded` is considered non-terminal or
/// successful; anything above it is a definitive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ready = 10,
    Preparing = 20,
    Running = 30,
    Paused = 40,
    Succeeded = 50,
    Killed = 60,
    Failed = 70,
    FailedFinishing = 80,
    Skipped = 90,
    Disabled = 100,
    Queued = 110,
    FailedSucceeded = 120,
    Cancelled = 130,
}

impl Status {
    pub const ALL: [Status; 13] = [
        Status::Ready,
        Status::Preparing,
        Status::Running,
        Status::Paused,
        Status::Succeeded,
        Status::Killed,
        Status::Failed,
        Status::FailedFinishing,
        Status::Skipped,
        Status::Disabled,
        Status::Queued,
        Status::FailedSucceeded,
        Status::Cancelled,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Upper-case name used in storage and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ready => "READY",
            Status::Preparing => "PREPARING",
            Status::Running => "RUNNING",
            Status::Paused => "PAUSED",
            Status::Succeeded => "SUCCEEDED",
            Status::Killed => "KILLED",
            Status::Failed => "FAILED",
            Status::FailedFinishing => "FAILED_FINISHING",
            Status::Skipped => "SKIPPED",
            Status::Disabled => "DISABLED",
            Status::Queued => "QUEUED",
            Status::FailedSucceeded => "FAILED_SUCCEEDED",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// Lower-case label shown on health records.
    pub fn label(self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    pub fn is_definitive_failure(self) -> bool {
        self > Status::Succeeded
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| HealthError::UnknownStatus(s.to_string()))
    }
}

/// One completed or in-progress run of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSample {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Status,
}

impl ExecutionSample {
    pub fn new(
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        status: Status,
    ) -> Self {
        Self {
            start_time,
            end_time,
            status,
        }
    }

    /// Wall-clock duration of a finished run.
    ///
    /// `None` when either bound is missing or the end precedes the start.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

/// Flow identifier: a flow name within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRef {
    pub project: String,
    pub flow: String,
}

impl FlowRef {
    pub fn new(project: impl Into<String>, flow: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            flow: flow.into(),
        }
    }
}

impl fmt::Display for FlowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.flow)
    }
}

/// Caller-supplied knobs for one evaluation batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationParameters {
    pub history_limit: u32,
    pub tolerance_fraction: f64,
    pub now: DateTime<Utc>,
}

impl EvaluationParameters {
    /// Validate raw parameters. Nothing is clamped: bad input is an error.
    pub fn new(history_limit: i64, tolerance_fraction: f64, now: DateTime<Utc>) -> Result<Self, HealthError> {
        let history_limit = u32::try_from(history_limit)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or(HealthError::InvalidHistoryLimit(history_limit))?;

        if !tolerance_fraction.is_finite() || tolerance_fraction < 0.0 {
            return Err(HealthError::InvalidTolerance(tolerance_fraction));
        }

        Ok(Self {
            history_limit,
            tolerance_fraction,
            now,
        })
    }

    /// Apply optional overrides (e.g. query parameters) on top of defaults.
    pub fn with_overrides(
        defaults: &EvaluationParameters,
        history_limit: Option<i64>,
        tolerance_fraction: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Self, HealthError> {
        Self::new(
            history_limit.unwrap_or(i64::from(defaults.history_limit)),
            tolerance_fraction.unwrap_or(defaults.tolerance_fraction),
            now,
        )
    }
}

impl Default for EvaluationParameters {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            tolerance_fraction: DEFAULT_TOLERANCE_FRACTION,
            now: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_status_order_around_succeeded() {
        assert!(Status::Preparing < Status::Running);
        assert!(Status::Running < Status::Succeeded);
        assert!(Status::Succeeded < Status::Killed);
        assert!(Status::Killed < Status::Failed);
        assert!(!Status::Succeeded.is_definitive_failure());
        assert!(Status::Failed.is_definitive_failure());
        assert_eq!(Status::Succeeded.code(), 50);
    }

    #[test]
    fn test_status_parse_and_label() {
        assert_eq!("running".parse::<Status>().unwrap(), Status::Running);
        assert_eq!("failed-finishing".parse::<Status>().unwrap(), Status::FailedFinishing);
        assert_eq!(Status::FailedFinishing.label(), "failed_finishing");
        assert_eq!(
            "bogus".parse::<Status>(),
            Err(HealthError::UnknownStatus("bogus".to_string()))
        );
    }

    #[test]
    fn test_duration_requires_both_bounds() {
        let start = t0();
        let end = start + Duration::milliseconds(1500);
        assert_eq!(
            ExecutionSample::new(Some(start), Some(end), Status::Succeeded).duration(),
            Some(Duration::milliseconds(1500))
        );
        assert_eq!(ExecutionSample::new(Some(start), None, Status::Running).duration(), None);
        assert_eq!(ExecutionSample::new(None, Some(end), Status::Succeeded).duration(), None);
        // end before start is malformed
        assert_eq!(ExecutionSample::new(Some(end), Some(start), Status::Succeeded).duration(), None);
    }

    #[test]
    fn test_parameters_reject_bad_input() {
        assert_eq!(
            EvaluationParameters::new(0, 0.1, t0()),
            Err(HealthError::InvalidHistoryLimit(0))
        );
        assert_eq!(
            EvaluationParameters::new(-5, 0.1, t0()),
            Err(HealthError::InvalidHistoryLimit(-5))
        );
        assert_eq!(
            EvaluationParameters::new(30, -0.5, t0()),
            Err(HealthError::InvalidTolerance(-0.5))
        );
        assert!(EvaluationParameters::new(30, f64::NAN, t0()).is_err());
        assert!(EvaluationParameters::new(1, 0.0, t0()).is_ok());
    }

    #[test]
    fn test_overrides_fall_back_to_defaults() {
        let defaults = EvaluationParameters::default();
        let params = EvaluationParameters::with_overrides(&defaults, None, Some(0.25), t0()).unwrap();
        assert_eq!(params.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(params.tolerance_fraction, 0.25);
        assert_eq!(params.now, t0());
    }
}
