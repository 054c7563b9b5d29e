//! On-demand CSV export endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, AppState};

use super::{Librarian, MessageResponse};

/// Export every book request to CSV and mail it to the caller
#[utoipa::path(
    post,
    path = "/export/csv",
    tag = "export",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "CSV export completed", body = MessageResponse),
        (status = 403, description = "Librarian role required"),
        (status = 500, description = "Error in exporting CSV", body = crate::error::ErrorResponse)
    )
)]
pub async fn export_csv(
    State(state): State<AppState>,
    Librarian(caller): Librarian,
) -> AppResult<Json<MessageResponse>> {
    let recipient = state.services.users.email_of(caller.user_id).await?;
    let path = state.jobs.export_csv(recipient).await?;
    tracing::info!(user_id = caller.user_id, "CSV export written to {}", path.display());
    Ok(MessageResponse::new("CSV export completed"))
}
