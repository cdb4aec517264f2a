//! Collaborator interfaces the evaluator reads from.
//!
//! Stores are passed in at call time so tests can supply fixed fixtures.

use super::{ExecutionSample, FlowRef};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Executes a flow when the trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteFlowAction {
    pub project: String,
    pub flow: String,
}

impl ExecuteFlowAction {
    pub fn flow_ref(&self) -> FlowRef {
        FlowRef::new(&self.project, &self.flow)
    }
}

/// Action attached to a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerAction {
    ExecuteFlow(ExecuteFlowAction),
    KillExecution(FlowRef),
}

/// A named schedule as seen by the health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    /// Next time the trigger condition is checked; `None` if it never fires again.
    pub next_check: Option<DateTime<Utc>>,
    pub actions: Vec<TriggerAction>,
}

impl Trigger {
    /// The first action that executes a flow, if any.
    pub fn execute_flow_action(&self) -> Option<&ExecuteFlowAction> {
        self.actions.iter().find_map(|action| match action {
            TriggerAction::ExecuteFlow(exec) => Some(exec),
            _ => None,
        })
    }
}

/// Schedule/trigger store.
pub trait ScheduleSource {
    fn triggers(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>>;
}

/// Execution history store.
pub trait ExecutionHistory {
    /// Most recent execution of the flow, whatever its status.
    fn latest_execution(&self, flow: &FlowRef) -> Result<Option<ExecutionSample>>;

    /// Up to `limit` most recent `SUCCEEDED` executions, most-recent-first.
    fn recent_successes(&self, flow: &FlowRef, limit: u32) -> Result<Vec<ExecutionSample>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_flow_action_skips_other_actions() {
        let trigger = Trigger {
            name: "nightly".to_string(),
            next_check: None,
            actions: vec![
                TriggerAction::KillExecution(FlowRef::new("etl", "load")),
                TriggerAction::ExecuteFlow(ExecuteFlowAction {
                    project: "etl".to_string(),
                    flow: "load".to_string(),
                }),
            ],
        };
        let action = trigger.execute_flow_action().unwrap();
        assert_eq!(action.flow_ref(), FlowRef::new("etl", "load"));
    }

    #[test]
    fn test_trigger_without_flow_action() {
        let trigger = Trigger {
            name: "cleanup".to_string(),
            next_check: None,
            actions: vec![],
        };
        assert!(trigger.execute_flow_action().is_none());
    }

    #[test]
    fn test_action_json_is_tagged() {
        let action = TriggerAction::ExecuteFlow(ExecuteFlowAction {
            project: "etl".to_string(),
            flow: "load".to_string(),
        });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "execute_flow");
        assert_eq!(json["flow"], "load");
        let back: TriggerAction = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_kill_action_carries_flow_ref() {
        let json = serde_json::json!({ "kind": "kill_execution", "project": "etl", "flow": "load" });
        let action: TriggerAction = serde_json::from_value(json).unwrap();
        assert_eq!(action, TriggerAction::KillExecution(FlowRef::new("etl", "load")));
    }
}
