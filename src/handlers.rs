use crate::aggregate;
use crate::errors::AppError;
use crate::models::{
    BreakdownResponse, LocationSeries, MonthlyAmountBreakdown, MonthlyMembership,
    MonthlyProgramBreakdown, MonthlyRevenue,
};
use crate::state::AppState;
use crate::storage::{self, MEMBER_FILES, PAYMENTS_FILE};
use crate::timeline::{self, MonthSlot};
use axum::{
    extract::{Query, State},
    response::Html,
    Json,
};
use serde::Deserialize;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub file: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Validated `start`/`end` bounds; both or neither must be present.
fn month_bounds(query: &SeriesQuery) -> Result<Option<(String, String)>, AppError> {
    match (&query.start, &query.end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => {
            if timeline::parse_month(start).is_none() || timeline::parse_month(end).is_none() {
                return Err(AppError::bad_request(
                    "start and end must be YYYY-MM month keys",
                ));
            }
            Ok(Some((start.clone(), end.clone())))
        }
        _ => Err(AppError::bad_request(
            "start and end must be provided together",
        )),
    }
}

fn clip<T: MonthSlot + Clone>(data: Vec<T>, bounds: &Option<(String, String)>) -> Vec<T> {
    match bounds {
        Some((start, end)) => timeline::fill_range(&data, start, end),
        None => data,
    }
}

fn clip_series<T: MonthSlot + Clone>(
    series: LocationSeries<T>,
    bounds: &Option<(String, String)>,
) -> LocationSeries<T> {
    LocationSeries {
        all_data: clip(series.all_data, bounds),
        los_gatos_data: clip(series.los_gatos_data, bounds),
        pleasanton_data: clip(series.pleasanton_data, bounds),
    }
}

/// Whitelist check for the members `file` parameter. Runs before any file
/// I/O so an unknown name never reaches the filesystem.
fn member_file(query: &SeriesQuery) -> Result<String, AppError> {
    let file = query.file.as_deref().unwrap_or("membersbeta.csv");
    if !MEMBER_FILES.contains(&file) {
        return Err(AppError::bad_request(
            "Invalid file parameter. Must be membersbeta.csv or membersalpha.csv",
        ));
    }
    Ok(file.to_string())
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn revenue_data(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<LocationSeries<MonthlyRevenue>>, AppError> {
    let bounds = month_bounds(&query)?;
    let payments = storage::load_payments(&state.search_dirs, PAYMENTS_FILE)
        .await
        .map_err(|err| {
            error!("failed to load revenue data: {err}");
            AppError::internal(err)
        })?;

    Ok(Json(clip_series(
        aggregate::revenue_by_location(&payments),
        &bounds,
    )))
}

pub async fn amount_breakdown(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<BreakdownResponse>, AppError> {
    let bounds = month_bounds(&query)?;
    let payments = storage::load_payments(&state.search_dirs, PAYMENTS_FILE)
        .await
        .map_err(|err| {
            error!("failed to load revenue amount breakdown: {err}");
            AppError::internal(err)
        })?;

    let breakdown = clip(aggregate::monthly_amount_breakdown(&payments), &bounds);
    Ok(Json(BreakdownResponse { breakdown }))
}

pub async fn amount_breakdown_by_location(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<LocationSeries<MonthlyAmountBreakdown>>, AppError> {
    let bounds = month_bounds(&query)?;
    let payments = storage::load_payments(&state.search_dirs, PAYMENTS_FILE)
        .await
        .map_err(|err| {
            error!("failed to load location amount breakdown: {err}");
            AppError::internal(err)
        })?;

    Ok(Json(clip_series(
        aggregate::amount_breakdown_by_location(&payments),
        &bounds,
    )))
}

pub async fn membership_data(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<LocationSeries<MonthlyMembership>>, AppError> {
    let file = member_file(&query)?;
    let bounds = month_bounds(&query)?;
    let members = storage::load_members(&state.search_dirs, &file)
        .await
        .map_err(|err| {
            error!("failed to load membership data from {file}: {err}");
            AppError::internal(err)
        })?;

    Ok(Json(clip_series(
        aggregate::memberships_by_location(&members),
        &bounds,
    )))
}

pub async fn membership_program_breakdown(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<LocationSeries<MonthlyProgramBreakdown>>, AppError> {
    let file = member_file(&query)?;
    let bounds = month_bounds(&query)?;
    let members = storage::load_members(&state.search_dirs, &file)
        .await
        .map_err(|err| {
            error!("failed to load membership program breakdown from {file}: {err}");
            AppError::internal(err)
        })?;

    Ok(Json(clip_series(
        aggregate::program_breakdown_by_location(&members),
        &bounds,
    )))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8" /><title>Studio Metrics</title></head>
<body>
  <h1>Studio Metrics API</h1>
  <p>Read-only JSON endpoints over the studio's CSV exports. Optional
  <code>start</code>/<code>end</code> (YYYY-MM) clip each series and
  zero-fill missing months.</p>
  <ul>
    <li><a href="/api/revenue-data">/api/revenue-data</a></li>
    <li><a href="/api/revenue-data/amount-breakdown">/api/revenue-data/amount-breakdown</a></li>
    <li><a href="/api/revenue-data/amount-breakdown-by-location">/api/revenue-data/amount-breakdown-by-location</a></li>
    <li><a href="/api/membership-data">/api/membership-data?file=membersbeta.csv</a></li>
    <li><a href="/api/membership-program-breakdown">/api/membership-program-breakdown?file=membersbeta.csv</a></li>
  </ul>
</body>
</html>
"#;
