//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, browse, ebooks, export, health, requests, sections, stats};

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "E-book lending library REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html"),
        contact(name = "Libris Team", email = "dev@libris.org")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::librarian_login,
        // Dashboard
        stats::dashboard,
        // Sections
        sections::list_sections,
        sections::create_section,
        sections::get_section,
        sections::update_section,
        sections::delete_section,
        sections::section_ebooks,
        // E-books
        ebooks::upload_ebook,
        ebooks::update_ebook,
        ebooks::delete_ebook,
        ebooks::get_uploaded_file,
        // Requests
        requests::list_requests,
        requests::grant_request,
        requests::revoke_request,
        requests::delete_request,
        requests::request_book,
        requests::return_book,
        requests::request_limit,
        requests::request_status,
        requests::issued_books,
        // Browse
        browse::book_details,
        browse::sections_with_books,
        browse::search,
        browse::rate_book,
        // Export
        export::export_csv,
    ),
    components(
        schemas(
            // Auth
            crate::models::user::RegisterUser,
            crate::models::user::LoginRequest,
            crate::models::user::LoginResponse,
            crate::models::user::RoleName,
            // Catalog
            crate::models::section::Section,
            crate::models::section::SectionRef,
            crate::models::section::SectionWithBooks,
            crate::models::section::CreateSection,
            crate::models::section::UpdateSection,
            crate::models::ebook::EBook,
            crate::models::ebook::EBookShort,
            crate::models::ebook::EBookListing,
            crate::models::ebook::EBookDetails,
            crate::models::ebook::UpdateEBook,
            crate::models::ebook::SearchResults,
            ebooks::UploadForm,
            // Requests
            crate::models::book_request::BookRequest,
            crate::models::book_request::CreateBookRequest,
            crate::models::book_request::RequestLimit,
            crate::models::book_request::RequestStatus,
            crate::models::book_request::IssuedBook,
            // Feedback
            crate::models::feedback::RateBook,
            browse::RatingResponse,
            // Stats
            crate::models::stats::DashboardStats,
            // Common
            health::HealthResponse,
            super::MessageResponse,
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and login"),
        (name = "stats", description = "Librarian dashboard"),
        (name = "sections", description = "Section management"),
        (name = "ebooks", description = "E-book management"),
        (name = "requests", description = "Request review by librarians"),
        (name = "borrowing", description = "Requesting and returning books"),
        (name = "browse", description = "Public catalog browsing and ratings"),
        (name = "export", description = "CSV export")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
