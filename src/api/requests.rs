//! Book request endpoints: librarian review and user borrowing

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::book_request::{
        BookRequest, CreateBookRequest, IssuedBook, RequestLimit, RequestStatus,
    },
    AppState,
};

use super::{AuthenticatedUser, Librarian, MessageResponse, ValidatedJson};

/// List every request
#[utoipa::path(
    get,
    path = "/requests",
    tag = "requests",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All requests", body = Vec<BookRequest>),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
) -> AppResult<Json<Vec<BookRequest>>> {
    let requests = state.services.borrowing.list_all().await?;
    Ok(Json(requests))
}

/// Grant a pending request; the loan runs for seven days
#[utoipa::path(
    post,
    path = "/requests/{id}/grant",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request granted", body = BookRequest),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn grant_request(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
) -> AppResult<Json<BookRequest>> {
    let request = state.services.borrowing.grant(id).await?;
    Ok(Json(request))
}

/// End a granted loan
#[utoipa::path(
    post,
    path = "/requests/{id}/revoke",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request revoked", body = BookRequest),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not granted", body = crate::error::ErrorResponse)
    )
)]
pub async fn revoke_request(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
) -> AppResult<Json<BookRequest>> {
    let request = state.services.borrowing.revoke(id).await?;
    Ok(Json(request))
}

/// Delete a request in any state
#[utoipa::path(
    delete,
    path = "/requests/{id}",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request deleted", body = MessageResponse),
        (status = 404, description = "Request not found")
    )
)]
pub async fn delete_request(
    State(state): State<AppState>,
    Librarian(_caller): Librarian,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    state.services.borrowing.delete(id).await?;
    Ok(MessageResponse::new("Request revoked and deleted"))
}

/// Request a book
#[utoipa::path(
    post,
    path = "/book/request",
    tag = "borrowing",
    security(("bearer_auth" = [])),
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book requested", body = BookRequest),
        (status = 400, description = "Request limit reached", body = crate::error::ErrorResponse),
        (status = 404, description = "EBook not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_book(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    ValidatedJson(data): ValidatedJson<CreateBookRequest>,
) -> AppResult<(StatusCode, Json<BookRequest>)> {
    let request = state
        .services
        .borrowing
        .request_book(caller.user_id, data.ebook_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/book/return/{id}",
    tag = "borrowing",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "EBook ID")),
    responses(
        (status = 200, description = "Book returned", body = BookRequest),
        (status = 404, description = "No granted request found for this book", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(ebook_id): Path<i32>,
) -> AppResult<Json<BookRequest>> {
    let request = state
        .services
        .borrowing
        .return_book(caller.user_id, ebook_id)
        .await?;
    Ok(Json(request))
}

/// Whether the caller may request more books
#[utoipa::path(
    get,
    path = "/book/request/limit",
    tag = "borrowing",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Request limit", body = RequestLimit)
    )
)]
pub async fn request_limit(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> AppResult<Json<RequestLimit>> {
    let limit = state.services.borrowing.limit(caller.user_id).await?;
    Ok(Json(limit))
}

/// The caller's request state for a book
#[utoipa::path(
    get,
    path = "/book/request/status/{id}",
    tag = "borrowing",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "EBook ID")),
    responses(
        (status = 200, description = "Request status", body = RequestStatus)
    )
)]
pub async fn request_status(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(ebook_id): Path<i32>,
) -> AppResult<Json<RequestStatus>> {
    let status = state
        .services
        .borrowing
        .status(caller.user_id, ebook_id)
        .await?;
    Ok(Json(status))
}

/// Books currently on loan to the caller
#[utoipa::path(
    get,
    path = "/issued_books",
    tag = "borrowing",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Issued books", body = Vec<IssuedBook>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn issued_books(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> AppResult<Json<Vec<IssuedBook>>> {
    let books = state.services.borrowing.issued_books(caller.user_id).await?;
    Ok(Json(books))
}
