use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use rusqlite::params;
use serde::Serialize;
use std::str::FromStr;
use tracing::warn;

use crate::health::source::{ExecuteFlowAction, ScheduleSource, Trigger, TriggerAction};
use crate::health::FlowRef;
use crate::storage::Pool;

/// Longest window accepted by [`ScheduleStore::preview_next_runs`].
pub const MAX_PREVIEW_HOURS: u64 = 24 * 366;

/// A stored schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub name: String,
    pub cron_expr: String,
    pub actions: Vec<TriggerAction>,
    pub enabled: bool,
}

/// Schedules persisted in SQLite, each a cron expression plus trigger actions.
///
/// flowwatch never fires these itself; it only reads them to know which
/// flows are expected to run and when they are next due.
#[derive(Clone)]
pub struct ScheduleStore {
    pool: Pool,
}

fn parse_cron(cron_expr: &str) -> Result<CronSchedule> {
    CronSchedule::from_str(cron_expr)
        .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", cron_expr, e))
}

impl ScheduleStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Add a schedule with arbitrary actions.
    pub fn add_schedule(&self, name: &str, cron_expr: &str, actions: &[TriggerAction]) -> Result<()> {
        parse_cron(cron_expr)?;
        let actions_json = serde_json::to_string(actions)?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO schedules (name, cron_expr, actions_json, enabled) VALUES (?1, ?2, ?3, 1)",
            params![name, cron_expr, actions_json],
        )
        .with_context(|| format!("Failed to insert schedule '{}'", name))?;

        Ok(())
    }

    /// Add a schedule that executes a single flow.
    pub fn add_flow_schedule(&self, name: &str, cron_expr: &str, flow: &FlowRef) -> Result<()> {
        let action = TriggerAction::ExecuteFlow(ExecuteFlowAction {
            project: flow.project.clone(),
            flow: flow.flow.clone(),
        });
        self.add_schedule(name, cron_expr, &[action])
    }

    /// List all schedules
    pub fn list(&self) -> Result<Vec<ScheduleEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT name, cron_expr, actions_json, enabled FROM schedules ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)? != 0,
            ))
        })?;

        let mut list = Vec::new();
        for r in rows {
            let (name, cron_expr, actions_json, enabled) = r?;
            let actions: Vec<TriggerAction> = serde_json::from_str(&actions_json)
                .with_context(|| format!("Schedule '{}' has malformed actions", name))?;
            list.push(ScheduleEntry {
                name,
                cron_expr,
                actions,
                enabled,
            });
        }
        Ok(list)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let changed = conn.execute("DELETE FROM schedules WHERE name = ?1", params![name])?;
        if changed == 0 {
            anyhow::bail!("Schedule '{}' not found", name);
        }
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE schedules SET enabled = ?1, updated_at = datetime('now') WHERE name = ?2",
            params![enabled as i64, name],
        )?;
        if changed == 0 {
            anyhow::bail!("Schedule '{}' not found", name);
        }
        Ok(())
    }

    /// Upcoming fire times of enabled schedules within `hours` of `now`.
    /// This is strictly a dry-run preview.
    pub fn preview_next_runs(&self, now: DateTime<Utc>, hours: u64) -> Result<Vec<(DateTime<Utc>, String)>> {
        if hours > MAX_PREVIEW_HOURS {
            anyhow::bail!("Preview window of {} hours exceeds {} hours", hours, MAX_PREVIEW_HOURS);
        }
        let end = now + chrono::Duration::hours(hours as i64);
        let mut preview = Vec::new();

        for entry in self.list()?.into_iter().filter(|e| e.enabled) {
            if let Ok(schedule) = parse_cron(&entry.cron_expr) {
                for next_time in schedule.after(&now) {
                    if next_time > end {
                        break;
                    }
                    preview.push((next_time, entry.name.clone()));
                }
            }
        }

        preview.sort();
        Ok(preview)
    }
}

impl ScheduleSource for ScheduleStore {
    fn triggers(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>> {
        let entries = self.list()?;
        let triggers = entries
            .into_iter()
            .map(|entry| {
                let next_check = if entry.enabled {
                    match parse_cron(&entry.cron_expr) {
                        Ok(schedule) => schedule.after(&now).next(),
                        Err(e) => {
                            warn!(schedule = %entry.name, "{}", e);
                            None
                        }
                    }
                } else {
                    None
                };
                Trigger {
                    name: entry.name,
                    next_check,
                    actions: entry.actions,
                }
            })
            .collect();
        Ok(triggers)
    }
}
