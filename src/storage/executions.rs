//! Execution history as reported by the flow executor.

use super::{decode_time, encode_time, Pool};
use crate::health::source::ExecutionHistory;
use crate::health::{ExecutionSample, FlowRef, Status};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

/// A stored execution with its row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub flow: FlowRef,
    pub sample: ExecutionSample,
}

type RawRow = (i64, String, String, String, Option<String>, Option<String>);

/// SQLite-backed execution log.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: Pool,
}

impl SqliteHistory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Record a new execution that started at `start_time`.
    pub fn start_execution(&self, flow: &FlowRef, status: Status, start_time: DateTime<Utc>) -> Result<i64> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO executions (project, flow_name, status, start_time) VALUES (?1, ?2, ?3, ?4)",
            params![flow.project, flow.flow, status.as_str(), encode_time(start_time)],
        )
        .context("Failed to insert execution")?;
        Ok(conn.last_insert_rowid())
    }

    /// Update the status of an execution, stamping its end time if given.
    pub fn finish_execution(&self, id: i64, status: Status, end_time: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.pool.get()?;
        let start: Option<String> = conn
            .query_row("SELECT start_time FROM executions WHERE id = ?1", params![id], |row| row.get(0))
            .with_context(|| format!("Execution {} not found", id))?;

        if let (Some(start), Some(end)) = (decode_time(start)?, end_time) {
            if end < start {
                anyhow::bail!("Execution {} cannot end before it started", id);
            }
        }

        conn.execute(
            "UPDATE executions SET status = ?1, end_time = ?2, updated_at = datetime('now') WHERE id = ?3",
            params![status.as_str(), end_time.map(encode_time), id],
        )
        .context("Failed to update execution")?;
        Ok(())
    }

    /// Recent executions of a flow, newest first.
    pub fn list(&self, flow: &FlowRef, limit: u32) -> Result<Vec<ExecutionRecord>> {
        self.query(flow, None, limit)
    }

    fn query(&self, flow: &FlowRef, status: Option<Status>, limit: u32) -> Result<Vec<ExecutionRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, project, flow_name, status, start_time, end_time FROM executions
             WHERE project = ?1 AND flow_name = ?2 AND (?3 IS NULL OR status = ?3)
             ORDER BY id DESC
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(
            params![flow.project, flow.flow, status.map(Status::as_str), limit],
            |row| -> rusqlite::Result<RawRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for r in rows {
            records.push(decode_row(r?)?);
        }
        Ok(records)
    }
}

fn decode_row((id, project, flow_name, status, start, end): RawRow) -> Result<ExecutionRecord> {
    let status: Status = status
        .parse()
        .with_context(|| format!("Execution {} has an invalid status", id))?;
    Ok(ExecutionRecord {
        id,
        flow: FlowRef::new(project, flow_name),
        sample: ExecutionSample::new(decode_time(start)?, decode_time(end)?, status),
    })
}

impl ExecutionHistory for SqliteHistory {
    fn latest_execution(&self, flow: &FlowRef) -> Result<Option<ExecutionSample>> {
        let mut latest = self.query(flow, None, 1)?;
        Ok(latest.pop().map(|record| record.sample))
    }

    fn recent_successes(&self, flow: &FlowRef, limit: u32) -> Result<Vec<ExecutionSample>> {
        let records = self.query(flow, Some(Status::Succeeded), limit)?;
        Ok(records.into_iter().map(|record| record.sample).collect())
    }
}
