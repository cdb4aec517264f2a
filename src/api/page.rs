//! HTML status page for monitoring systems that scrape a web page.

use askama::Template;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;

use super::error::ApiError;
use super::routes::{overall_status, run_check, HealthQuery};
use super::state::AppState;
use crate::health::format::format_instant;
use crate::health::FlowHealthRecord;

#[derive(Template)]
#[template(path = "status.html")]
struct StatusPage<'a> {
    all_healthy: bool,
    flows: &'a [FlowHealthRecord],
    generated_at: String,
    history_limit: u32,
    tolerance_fraction: f64,
}

pub(super) async fn status_page(
    State(state): State<AppState>,
    query: Result<Query<HealthQuery>, QueryRejection>,
) -> Result<(StatusCode, Html<String>), ApiError> {
    let Query(query) = query?;
    let (params, report) = run_check(&state, &query).await?;

    let page = StatusPage {
        all_healthy: report.all_healthy,
        flows: &report.flows,
        generated_at: format_instant(params.now),
        history_limit: params.history_limit,
        tolerance_fraction: params.tolerance_fraction,
    };
    let body = page.render().map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((overall_status(&report), Html(body)))
}
