use super::evaluator::{evaluate, FlowHealthRecord, FlowSnapshot};
use super::source::{ExecutionHistory, ScheduleSource};
use super::EvaluationParameters;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

/// Health of every scheduled flow that has run at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub all_healthy: bool,
    pub flows: Vec<FlowHealthRecord>,
}

/// Evaluate every snapshot in order, dropping flows that never ran.
pub fn evaluate_all(snapshots: &[FlowSnapshot], params: &EvaluationParameters) -> BatchReport {
    let flows: Vec<FlowHealthRecord> = snapshots
        .iter()
        .filter_map(|snapshot| evaluate(snapshot, params))
        .collect();
    let all_healthy = flows.iter().all(|record| record.healthy);

    BatchReport { all_healthy, flows }
}

/// Gather a snapshot for each trigger that executes a flow.
///
/// Any store failure aborts the whole batch.
pub fn collect_snapshots<S, H>(schedules: &S, history: &H, params: &EvaluationParameters) -> Result<Vec<FlowSnapshot>>
where
    S: ScheduleSource + ?Sized,
    H: ExecutionHistory + ?Sized,
{
    let triggers = schedules.triggers(params.now).context("Failed to load triggers")?;
    let mut snapshots = Vec::with_capacity(triggers.len());

    for trigger in &triggers {
        let Some(action) = trigger.execute_flow_action() else {
            debug!(trigger = %trigger.name, "Trigger has no flow action, skipping");
            continue;
        };
        let flow = action.flow_ref();

        let latest = history
            .latest_execution(&flow)
            .with_context(|| format!("Failed to load latest execution for flow '{}'", flow))?;
        let recent_successes = history
            .recent_successes(&flow, params.history_limit)
            .with_context(|| format!("Failed to load succeeded executions for flow '{}'", flow))?;
        info!(
            flow = %flow,
            trigger = %trigger.name,
            has_latest = latest.is_some(),
            succeeded = recent_successes.len(),
            "Loaded flow history"
        );

        snapshots.push(FlowSnapshot {
            flow,
            next_execution: trigger.next_check,
            latest,
            recent_successes,
        });
    }

    Ok(snapshots)
}

/// Load every scheduled flow from the stores and evaluate it.
pub fn check<S, H>(schedules: &S, history: &H, params: &EvaluationParameters) -> Result<BatchReport>
where
    S: ScheduleSource + ?Sized,
    H: ExecutionHistory + ?Sized,
{
    let snapshots = collect_snapshots(schedules, history, params)?;
    let report = evaluate_all(&snapshots, params);
    info!(
        flows = report.flows.len(),
        all_healthy = report.all_healthy,
        "Health check complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::source::{ExecuteFlowAction, Trigger, TriggerAction};
    use crate::health::{ExecutionSample, FlowRef, Status};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn params() -> EvaluationParameters {
        EvaluationParameters::new(30, 0.1, t()).unwrap()
    }

    fn ms_success(duration_ms: i64) -> ExecutionSample {
        let start = t() - Duration::hours(1);
        ExecutionSample::new(
            Some(start),
            Some(start + Duration::milliseconds(duration_ms)),
            Status::Succeeded,
        )
    }

    fn snapshot(name: &str, latest: Option<ExecutionSample>) -> FlowSnapshot {
        FlowSnapshot {
            flow: FlowRef::new("proj", name),
            next_execution: None,
            latest,
            recent_successes: vec![ms_success(100), ms_success(200), ms_success(300)],
        }
    }

    #[test]
    fn test_empty_batch_is_healthy() {
        let report = evaluate_all(&[], &params());
        assert!(report.flows.is_empty());
        assert!(report.all_healthy);
    }

    #[test]
    fn test_scenario_running_flow_around_deadline() {
        // deadline = T + 300 + round(200 * 0.1) = T + 320
        let started = t();
        let running = ExecutionSample::new(Some(started), None, Status::Running);
        let snapshots = vec![snapshot("a", Some(running))];

        let at = |ms| EvaluationParameters::new(30, 0.1, started + Duration::milliseconds(ms)).unwrap();
        assert!(evaluate_all(&snapshots, &at(319)).all_healthy);
        assert!(evaluate_all(&snapshots, &at(320)).all_healthy);
        assert!(!evaluate_all(&snapshots, &at(321)).all_healthy);
    }

    #[test]
    fn test_never_run_flow_excluded_and_order_kept() {
        let snapshots = vec![
            snapshot("first", Some(ms_success(10))),
            snapshot("never", None),
            snapshot("third", Some(ExecutionSample::new(Some(t()), Some(t()), Status::Failed))),
        ];
        let report = evaluate_all(&snapshots, &params());
        let names: Vec<&str> = report.flows.iter().map(|r| r.flow_name.as_str()).collect();
        assert_eq!(names, vec!["first", "third"]);
        assert!(!report.all_healthy);
        assert_eq!(
            report.all_healthy,
            report.flows.iter().all(|r| r.healthy)
        );
    }

    #[test]
    fn test_never_run_flow_does_not_affect_health() {
        let snapshots = vec![snapshot("ok", Some(ms_success(10))), snapshot("never", None)];
        let report = evaluate_all(&snapshots, &params());
        assert_eq!(report.flows.len(), 1);
        assert!(report.all_healthy);
    }

    struct FixedSchedules(Vec<Trigger>);

    impl ScheduleSource for FixedSchedules {
        fn triggers(&self, _now: DateTime<Utc>) -> Result<Vec<Trigger>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FixedHistory {
        latest: HashMap<FlowRef, ExecutionSample>,
        successes: HashMap<FlowRef, Vec<ExecutionSample>>,
        broken: Option<FlowRef>,
    }

    impl ExecutionHistory for FixedHistory {
        fn latest_execution(&self, flow: &FlowRef) -> Result<Option<ExecutionSample>> {
            if self.broken.as_ref() == Some(flow) {
                anyhow::bail!("history store unreachable");
            }
            Ok(self.latest.get(flow).cloned())
        }

        fn recent_successes(&self, flow: &FlowRef, limit: u32) -> Result<Vec<ExecutionSample>> {
            let mut all = self.successes.get(flow).cloned().unwrap_or_default();
            all.truncate(limit as usize);
            Ok(all)
        }
    }

    fn flow_trigger(name: &str, flow: &str) -> Trigger {
        Trigger {
            name: name.to_string(),
            next_check: Some(t() + Duration::hours(1)),
            actions: vec![TriggerAction::ExecuteFlow(ExecuteFlowAction {
                project: "proj".to_string(),
                flow: flow.to_string(),
            })],
        }
    }

    #[test]
    fn test_check_uses_collaborators() {
        let schedules = FixedSchedules(vec![
            flow_trigger("hourly", "load"),
            Trigger {
                name: "reaper".to_string(),
                next_check: None,
                actions: vec![TriggerAction::KillExecution(FlowRef::new("proj", "load"))],
            },
            flow_trigger("daily", "never-ran"),
        ]);
        let mut history = FixedHistory::default();
        let load = FlowRef::new("proj", "load");
        history.latest.insert(load.clone(), ms_success(500));
        history.successes.insert(load, vec![ms_success(500)]);

        let report = check(&schedules, &history, &params()).unwrap();
        assert_eq!(report.flows.len(), 1);
        assert_eq!(report.flows[0].flow_name, "load");
        assert_eq!(report.flows[0].next_execution_time, "2024-05-01 09:00:00");
        assert!(report.all_healthy);
    }

    #[test]
    fn test_upstream_error_fails_whole_batch() {
        let schedules = FixedSchedules(vec![flow_trigger("hourly", "load"), flow_trigger("daily", "bad")]);
        let history = FixedHistory {
            broken: Some(FlowRef::new("proj", "bad")),
            ..Default::default()
        };

        let err = check(&schedules, &history, &params()).unwrap_err();
        assert!(err.to_string().contains("proj/bad"));
    }
}
