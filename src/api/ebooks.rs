//! E-book management endpoints (librarian)

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::ebook::{is_pdf_filename, EBook, EBookUpload, UpdateEBook},
    AppState,
};

use super::{Librarian, MessageResponse, ValidatedJson};

/// Documentation-only schema for the multipart upload body; the handler reads fields from `Multipart`
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
pub struct UploadForm {
    /// PDF file
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub title: String,
    pub authors: String,
    pub isbn: String,
    pub section_id: i32,
    pub description: Option<String>,
}

fn form_error(e: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(format!("Invalid upload form: {}", e))
}

/// Read the multipart form into an upload
async fn read_upload(mut multipart: Multipart) -> AppResult<EBookUpload> {
    let mut upload = EBookUpload::default();
    let mut has_file = false;
    let mut section_id = None;

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                upload.filename = field.file_name().unwrap_or_default().to_string();
                upload.bytes = field.bytes().await.map_err(form_error)?.to_vec();
                has_file = true;
            }
            "title" => upload.title = field.text().await.map_err(form_error)?,
            "authors" => upload.authors = field.text().await.map_err(form_error)?,
            "isbn" => upload.isbn = field.text().await.map_err(form_error)?,
            "description" => {
                let text = field.text().await.map_err(form_error)?;
                upload.description = Some(text).filter(|t| !t.trim().is_empty());
            }
            "section_id" => {
                let text = field.text().await.map_err(form_error)?;
                section_id = Some(text.trim().parse::<i32>().map_err(|_| {
                    AppError::Validation(format!("Invalid section_id: {}", text))
                })?);
            }
            other => tracing::debug!("Ignoring upload field {}", other),
        }
    }

    if !has_file {
        return Err(AppError::BadRequest("No file part".to_string()));
    }
    upload.section_id =
        section_id.ok_or_else(|| AppError::Validation("section_id is required".to_string()))?;
    Ok(upload)
}

/// Upload a PDF and create its e-book record
#[utoipa::path(
    post,
    path = "/librarian/upload",
    tag = "ebooks",
    security(("bearer_auth" = [])),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "EBook uploaded", body = EBook),
        (status = 400, description = "Missing file, bad ISBN or non-PDF file", body = crate::error::ErrorResponse),
        (status = 404, description = "Section not found", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN already catalogued", body = crate::error::ErrorResponse)
    )
)]
pub async fn upload_ebook(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<EBook>)> {
    let upload = read_upload(multipart).await?;
    let ebook = state.services.catalog.upload_ebook(upload).await?;
    Ok((StatusCode::CREATED, Json(ebook)))
}

/// Update e-book metadata
#[utoipa::path(
    put,
    path = "/librarian/ebooks/{id}",
    tag = "ebooks",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "EBook ID")),
    request_body = UpdateEBook,
    responses(
        (status = 200, description = "EBook updated", body = EBook),
        (status = 404, description = "EBook not found")
    )
)]
pub async fn update_ebook(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
    ValidatedJson(data): ValidatedJson<UpdateEBook>,
) -> AppResult<Json<EBook>> {
    let ebook = state.services.catalog.update_ebook(id, data).await?;
    Ok(Json(ebook))
}

/// Delete an e-book with its requests and feedback
#[utoipa::path(
    delete,
    path = "/librarian/ebooks/{id}",
    tag = "ebooks",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "EBook ID")),
    responses(
        (status = 200, description = "EBook deleted", body = MessageResponse),
        (status = 404, description = "EBook not found")
    )
)]
pub async fn delete_ebook(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    state.services.catalog.delete_ebook(id).await?;
    Ok(MessageResponse::new("EBook deleted successfully"))
}

/// Download an uploaded file
#[utoipa::path(
    get,
    path = "/static/uploads/{filename}",
    tag = "ebooks",
    security(("bearer_auth" = [])),
    params(("filename" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "File content", content_type = "application/pdf"),
        (status = 404, description = "File not found")
    )
)]
pub async fn get_uploaded_file(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let bytes = state.services.catalog.read_upload(&filename).await?;
    let content_type = if is_pdf_filename(&filename) {
        "application/pdf"
    } else {
        "application/octet-stream"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
