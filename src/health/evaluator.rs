use super::format::{format_duration, format_instant, format_optional_instant, UNDEFINED};
use super::policy::classify;
use super::{EvaluationParameters, ExecutionSample, FlowRef, RuntimeStatistics};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything the evaluator needs to know about one scheduled flow.
#[derive(Debug, Clone)]
pub struct FlowSnapshot {
    pub flow: FlowRef,
    pub next_execution: Option<DateTime<Utc>>,
    /// Most recent execution of any status; `None` if the flow never ran.
    pub latest: Option<ExecutionSample>,
    /// Recent successful executions, most-recent-first.
    pub recent_successes: Vec<ExecutionSample>,
}

/// Per-flow health result, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowHealthRecord {
    pub project: String,
    pub flow_name: String,
    pub start_time: String,
    pub end_time: String,
    pub last_succeeded_runtime: String,
    pub average_succeeded_runtime: String,
    pub max_succeeded_runtime: String,
    pub next_execution_time: String,
    pub status: String,
    pub status_color: StatusColor,
    pub healthy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Red,
}

impl StatusColor {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusColor::Green => "green",
            StatusColor::Red => "red",
        }
    }
}

impl std::fmt::Display for StatusColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluate one flow. Returns `None` when the flow has never executed.
pub fn evaluate(snapshot: &FlowSnapshot, params: &EvaluationParameters) -> Option<FlowHealthRecord> {
    let latest = snapshot.latest.as_ref()?;

    let limit = snapshot.recent_successes.len().min(params.history_limit as usize);
    let stats = RuntimeStatistics::compute(&snapshot.recent_successes[..limit]);
    let verdict = classify(latest, &stats, params);

    Some(FlowHealthRecord {
        project: snapshot.flow.project.clone(),
        flow_name: snapshot.flow.flow.clone(),
        start_time: format_optional_instant(latest.start_time),
        end_time: format_optional_instant(latest.end_time),
        last_succeeded_runtime: format_duration(stats.last),
        average_succeeded_runtime: format_duration(stats.average),
        max_succeeded_runtime: format_duration(stats.max),
        next_execution_time: snapshot
            .next_execution
            .map(format_instant)
            .unwrap_or_else(|| UNDEFINED.to_string()),
        status: format!("{}{}", latest.status.label(), verdict.annotation.unwrap_or_default()),
        status_color: if verdict.healthy {
            StatusColor::Green
        } else {
            StatusColor::Red
        },
        healthy: verdict.healthy,
    })
}
