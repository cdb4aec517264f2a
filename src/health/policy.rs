//! Threshold policy for a flow's latest execution.
//!
//! Flows carry no fixed SLA. A run still in progress is judged against the
//! flow's own worst historical runtime plus a slack proportional to its
//! average runtime.

use super::format::format_instant;
use super::{EvaluationParameters, ExecutionSample, RuntimeStatistics, Status};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

/// Outcome of classifying one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub healthy: bool,
    /// Suffix appended to the status label, e.g. `" (current runtime in limit: ...)"`.
    pub annotation: Option<String>,
}

/// Instant after which an in-progress run started at `start` is overdue.
///
/// A deadline past the representable range saturates to
/// `DateTime::<Utc>::MAX_UTC`, i.e. the run is never overdue.
pub fn deadline(start: DateTime<Utc>, stats: &RuntimeStatistics, tolerance_fraction: f64) -> DateTime<Utc> {
    // `as` saturates, so the float product cannot wrap.
    let slack_ms = (stats.average.num_milliseconds() as f64 * tolerance_fraction).round() as i64;
    Duration::try_milliseconds(slack_ms)
        .and_then(|slack| stats.max.checked_add(&slack))
        .and_then(|allowed| start.checked_add_signed(allowed))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Decide whether `latest` is healthy given the flow's history.
pub fn classify(latest: &ExecutionSample, stats: &RuntimeStatistics, params: &EvaluationParameters) -> Verdict {
    if latest.status.is_definitive_failure() {
        return Verdict {
            healthy: false,
            annotation: None,
        };
    }

    if latest.status == Status::Succeeded {
        return Verdict {
            healthy: true,
            annotation: None,
        };
    }

    // A run reported in progress without a start time has not really begun.
    let start = latest.start_time.unwrap_or(params.now);
    let limit = deadline(start, stats, params.tolerance_fraction);
    info!(
        status = %latest.status,
        now = %format_instant(params.now),
        deadline = %format_instant(limit),
        "flow seems to be running"
    );

    if params.now > limit {
        Verdict {
            healthy: false,
            annotation: Some(format!(" (current runtime out of limit: {})", format_instant(limit))),
        }
    } else {
        Verdict {
            healthy: true,
            annotation: Some(format!(" (current runtime in limit: {})", format_instant(limit))),
        }
    }
}
