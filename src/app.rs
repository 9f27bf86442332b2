use crate::handlers;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/revenue-data", get(handlers::revenue_data))
        .route(
            "/api/revenue-data/amount-breakdown",
            get(handlers::amount_breakdown),
        )
        .route(
            "/api/revenue-data/amount-breakdown-by-location",
            get(handlers::amount_breakdown_by_location),
        )
        .route("/api/membership-data", get(handlers::membership_data))
        .route(
            "/api/membership-program-breakdown",
            get(handlers::membership_program_breakdown),
        )
        .with_state(state)
}
