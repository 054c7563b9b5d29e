//! Section management endpoints (librarian)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        ebook::EBookListing,
        section::{CreateSection, Section, UpdateSection},
    },
    AppState,
};

use super::{Librarian, MessageResponse, ValidatedJson};

/// List all sections
#[utoipa::path(
    get,
    path = "/sections",
    tag = "sections",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All sections", body = Vec<Section>),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn list_sections(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
) -> AppResult<Json<Vec<Section>>> {
    let sections = state.services.catalog.list_sections().await?;
    Ok(Json(sections))
}

/// Create a section
#[utoipa::path(
    post,
    path = "/sections",
    tag = "sections",
    security(("bearer_auth" = [])),
    request_body = CreateSection,
    responses(
        (status = 201, description = "Section created", body = Section),
        (status = 400, description = "Section name is required", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_section(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    ValidatedJson(data): ValidatedJson<CreateSection>,
) -> AppResult<(StatusCode, Json<Section>)> {
    let section = state.services.catalog.create_section(data).await?;
    Ok((StatusCode::CREATED, Json(section)))
}

/// Get a section
#[utoipa::path(
    get,
    path = "/sections/{id}",
    tag = "sections",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Section ID")),
    responses(
        (status = 200, description = "Section", body = Section),
        (status = 404, description = "Section not found")
    )
)]
pub async fn get_section(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
) -> AppResult<Json<Section>> {
    let section = state.services.catalog.get_section(id).await?;
    Ok(Json(section))
}

/// Update a section
#[utoipa::path(
    put,
    path = "/sections/{id}",
    tag = "sections",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Section ID")),
    request_body = UpdateSection,
    responses(
        (status = 200, description = "Section updated", body = Section),
        (status = 404, description = "Section not found")
    )
)]
pub async fn update_section(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
    ValidatedJson(data): ValidatedJson<UpdateSection>,
) -> AppResult<Json<Section>> {
    let section = state.services.catalog.update_section(id, data).await?;
    Ok(Json(section))
}

/// Delete a section with its e-books
#[utoipa::path(
    delete,
    path = "/sections/{id}",
    tag = "sections",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Section ID")),
    responses(
        (status = 200, description = "Section deleted", body = MessageResponse),
        (status = 404, description = "Section not found")
    )
)]
pub async fn delete_section(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    state.services.catalog.delete_section(id).await?;
    Ok(MessageResponse::new("Section deleted successfully"))
}

/// E-books of a section
#[utoipa::path(
    get,
    path = "/sections/{id}/ebooks",
    tag = "sections",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Section ID")),
    responses(
        (status = 200, description = "E-books in the section", body = Vec<EBookListing>)
    )
)]
pub async fn section_ebooks(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<EBookListing>>> {
    let ebooks = state.services.catalog.section_ebooks(id).await?;
    Ok(Json(ebooks))
}
