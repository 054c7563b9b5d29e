//! Librarian dashboard endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, models::stats::DashboardStats, AppState};

use super::Librarian;

/// Library totals and sections
#[utoipa::path(
    get,
    path = "/librarian/dashboard",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard figures", body = DashboardStats),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn dashboard(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
) -> AppResult<Json<DashboardStats>> {
    let stats = state.services.stats.dashboard().await?;
    Ok(Json(stats))
}
