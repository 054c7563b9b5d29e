//! API handlers for Libris REST endpoints

pub mod auth;
pub mod browse;
pub mod ebooks;
pub mod export;
pub mod health;
pub mod openapi;
pub mod requests;
pub mod sections;
pub mod stats;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    routing::{delete, get, post, put},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{Caller, RoleName},
    AppState,
};

/// Extractor for the authenticated caller.
///
/// The bearer token is decoded and the caller's roles are loaded from the
/// database once per request; later extractors reuse the resolved caller.
pub struct AuthenticatedUser(pub Caller);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>() {
            return Ok(AuthenticatedUser(caller.clone()));
        }

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Authentication("Missing or invalid authorization header".to_string()))?;

        let caller = state.services.users.authenticate(bearer.token()).await?;
        parts.extensions.insert(caller.clone());

        Ok(AuthenticatedUser(caller))
    }
}

/// Extractor for callers holding the `librarian` role
pub struct Librarian(pub Caller);

#[async_trait]
impl FromRequestParts<AppState> for Librarian {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(caller) = AuthenticatedUser::from_request_parts(parts, state).await?;
        caller.require_role(RoleName::Librarian)?;
        Ok(Librarian(caller))
    }
}

/// JSON body that has passed `validator` rules; malformed bodies are a 400
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| AppError::BadRequest(e.body_text()))?;
        value
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

/// Plain acknowledgement
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = state.config.storage.max_upload_bytes;

    let api = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Accounts
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/librarian/login", post(auth::librarian_login))
        // Dashboard
        .route("/librarian/dashboard", get(stats::dashboard))
        // Sections
        .route("/sections", get(sections::list_sections))
        .route("/sections", post(sections::create_section))
        .route("/sections/:id", get(sections::get_section))
        .route("/sections/:id", put(sections::update_section))
        .route("/sections/:id", delete(sections::delete_section))
        .route("/sections/:id/ebooks", get(sections::section_ebooks))
        // E-books
        .route(
            "/librarian/upload",
            post(ebooks::upload_ebook).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/librarian/ebooks/:id", put(ebooks::update_ebook))
        .route("/librarian/ebooks/:id", delete(ebooks::delete_ebook))
        .route("/static/uploads/:filename", get(ebooks::get_uploaded_file))
        // Requests (librarian)
        .route("/requests", get(requests::list_requests))
        .route("/requests/:id/grant", post(requests::grant_request))
        .route("/requests/:id/revoke", post(requests::revoke_request))
        .route("/requests/:id", delete(requests::delete_request))
        // Borrowing (user)
        .route("/book/request", post(requests::request_book))
        .route("/book/return/:id", post(requests::return_book))
        .route("/book/request/limit", get(requests::request_limit))
        .route("/book/request/status/:id", get(requests::request_status))
        .route("/issued_books", get(requests::issued_books))
        // Browsing
        .route("/book/rate", post(browse::rate_book))
        .route("/book/:id", get(browse::book_details))
        .route("/sections_with_books", get(browse::sections_with_books))
        .route("/search", get(browse::search))
        // Export
        .route("/export/csv", post(export::export_csv))
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
