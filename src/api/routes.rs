//! API route definitions.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::state::AppState;
use crate::health::{self, BatchReport, EvaluationParameters, FlowRef};
use crate::scheduler::cron::MAX_PREVIEW_HOURS;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(service_health))
        .route("/flows/health", get(flows_health))
        .route("/schedules", get(list_schedules))
        .route("/schedules/dry-run", get(schedule_dry_run))
        .route("/executions", get(list_executions))
}

/// Query parameters accepted by the health endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    pub limit: Option<i64>,
    #[serde(rename = "percentageFromAverage")]
    pub percentage_from_average: Option<f64>,
}

/// Run one health batch off the async runtime. `now` is captured once here.
pub(super) async fn run_check(
    state: &AppState,
    query: &HealthQuery,
) -> Result<(EvaluationParameters, BatchReport), ApiError> {
    let params = EvaluationParameters::with_overrides(
        &state.evaluation,
        query.limit,
        query.percentage_from_average,
        Utc::now(),
    )?;

    let schedules = state.schedules.clone();
    let history = state.history.clone();
    let report = tokio::task::spawn_blocking(move || health::check(&schedules, &history, &params)).await??;

    Ok((params, report))
}

/// 200 when every flow is healthy, 503 otherwise.
pub(super) fn overall_status(report: &BatchReport) -> StatusCode {
    if report.all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn service_health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn flows_health(
    State(state): State<AppState>,
    query: Result<Query<HealthQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Query(query) = query?;
    let (params, report) = run_check(&state, &query).await?;
    let status = overall_status(&report);

    Ok((
        status,
        Json(json!({
            "data": report,
            "meta": {
                "timestamp": params.now.to_rfc3339(),
                "history_limit": params.history_limit,
                "tolerance_fraction": params.tolerance_fraction,
                "total": report.flows.len()
            }
        })),
    ))
}

async fn list_schedules(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let schedules = state.schedules.clone();
    let list = tokio::task::spawn_blocking(move || schedules.list()).await??;
    Ok(Json(json!({ "data": list, "meta": { "total": list.len() } })))
}

#[derive(Debug, Deserialize)]
struct DryRunQuery {
    hours: Option<u64>,
}

async fn schedule_dry_run(
    State(state): State<AppState>,
    query: Result<Query<DryRunQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let hours = query.hours.unwrap_or(24);
    if hours > MAX_PREVIEW_HOURS {
        return Err(ApiError::bad_request(format!("hours must be at most {}", MAX_PREVIEW_HOURS)));
    }
    let schedules = state.schedules.clone();
    let preview = tokio::task::spawn_blocking(move || schedules.preview_next_runs(Utc::now(), hours)).await??;

    let upcoming: Vec<Value> = preview
        .into_iter()
        .map(|(at, name)| json!({ "at": at.to_rfc3339(), "schedule": name }))
        .collect();
    Ok(Json(json!({ "data": { "hours": hours, "upcoming": upcoming } })))
}

#[derive(Debug, Deserialize)]
struct ExecutionsQuery {
    project: String,
    flow: String,
    limit: Option<u32>,
}

async fn list_executions(
    State(state): State<AppState>,
    query: Result<Query<ExecutionsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(state.evaluation.history_limit);
    if limit == 0 {
        return Err(ApiError::bad_request("limit must be a positive integer"));
    }

    let flow = FlowRef::new(query.project, query.flow);
    let history = state.history.clone();
    let records = tokio::task::spawn_blocking(move || history.list(&flow, limit)).await??;
    Ok(Json(json!({ "data": records, "meta": { "total": records.len() } })))
}
