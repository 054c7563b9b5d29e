//! Section model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::ebook::EBookShort;

/// Section row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Section {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub date_created: DateTime<Utc>,
}

/// Section identity used in search results
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SectionRef {
    pub id: i32,
    pub name: String,
}

/// Section with its e-books, as browsed by users
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SectionWithBooks {
    pub id: i32,
    pub name: String,
    pub ebooks: Vec<EBookShort>,
}

/// Create section request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSection {
    #[validate(length(min = 1, max = 100, message = "Section name is required"))]
    pub name: String,
    pub description: Option<String>,
}

/// Update section request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSection {
    #[validate(length(min = 1, max = 100, message = "Section name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
}
