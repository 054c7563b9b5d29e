//! Public browsing and rating endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::{
        ebook::{EBookDetails, SearchResults},
        feedback::RateBook,
        section::SectionWithBooks,
    },
    AppState,
};

use super::{AuthenticatedUser, ValidatedJson};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Substring matched against section names and e-book title, authors and ISBN
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize, ToSchema)]
pub struct RatingResponse {
    pub message: String,
    /// New average rating of the e-book
    pub rating: f64,
}

/// E-book details
#[utoipa::path(
    get,
    path = "/book/{id}",
    tag = "browse",
    params(("id" = i32, Path, description = "EBook ID")),
    responses(
        (status = 200, description = "EBook details", body = EBookDetails),
        (status = 404, description = "EBook not found")
    )
)]
pub async fn book_details(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<EBookDetails>> {
    let details = state.services.catalog.ebook_details(id).await?;
    Ok(Json(details))
}

/// Sections with their e-books
#[utoipa::path(
    get,
    path = "/sections_with_books",
    tag = "browse",
    responses(
        (status = 200, description = "Sections with e-books", body = Vec<SectionWithBooks>)
    )
)]
pub async fn sections_with_books(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<SectionWithBooks>>> {
    let sections = state.services.catalog.sections_with_books().await?;
    Ok(Json(sections))
}

/// Search sections and e-books
#[utoipa::path(
    get,
    path = "/search",
    tag = "browse",
    params(SearchQuery),
    responses(
        (status = 200, description = "Search results", body = SearchResults)
    )
)]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<SearchResults>> {
    let results = state.services.catalog.search(&query.q).await?;
    Ok(Json(results))
}

/// Rate an e-book
#[utoipa::path(
    post,
    path = "/book/rate",
    tag = "browse",
    security(("bearer_auth" = [])),
    request_body = RateBook,
    responses(
        (status = 200, description = "Rating recorded", body = RatingResponse),
        (status = 400, description = "Rating must be between 0 and 5", body = crate::error::ErrorResponse),
        (status = 404, description = "EBook not found")
    )
)]
pub async fn rate_book(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    ValidatedJson(data): ValidatedJson<RateBook>,
) -> AppResult<Json<RatingResponse>> {
    let rating = state.services.catalog.rate_ebook(caller.user_id, data).await?;
    Ok(Json(RatingResponse {
        message: "Rating submitted successfully".to_string(),
        rating,
    }))
}
