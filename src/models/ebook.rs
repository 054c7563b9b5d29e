//! E-book model and intake helpers

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// ISBN-10 (last char may be X) or ISBN-13, after normalization
static ISBN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").expect("ISBN pattern is valid")
});

/// Width of the title, authors and content columns; also the file name limit
pub const MAX_FIELD_LEN: usize = 255;

/// E-book row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EBook {
    pub id: i32,
    pub title: String,
    /// File name of the stored PDF
    pub content: String,
    pub authors: String,
    pub isbn: String,
    pub rating: f64,
    pub description: Option<String>,
    pub date_issued: Option<DateTime<Utc>>,
    pub section_id: i32,
}

/// Short e-book representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EBookShort {
    pub id: i32,
    pub title: String,
    pub authors: String,
    pub isbn: String,
}

/// E-book as listed for librarians inside a section
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EBookListing {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub authors: String,
    pub isbn: String,
}

/// Public book details
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct EBookDetails {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub rating: f64,
}

/// Fields collected from an upload form
#[derive(Debug, Clone)]
pub struct NewEBook {
    pub title: String,
    pub content: String,
    pub authors: String,
    pub isbn: String,
    pub section_id: i32,
    pub description: Option<String>,
}

/// Multipart upload, as received from the librarian form
#[derive(Debug, Clone, Default)]
pub struct EBookUpload {
    pub title: String,
    pub authors: String,
    pub isbn: String,
    pub section_id: i32,
    pub description: Option<String>,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Search hits across sections and e-books
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchResults {
    pub sections: Vec<super::section::SectionRef>,
    pub ebooks: Vec<EBookShort>,
}

/// Update e-book request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEBook {
    #[validate(length(min = 1, max = 255, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Authors cannot be empty"))]
    pub authors: Option<String>,
    pub description: Option<String>,
}

/// Strip separators from an ISBN and check its shape
pub fn normalize_isbn(isbn: &str) -> AppResult<String> {
    let normalized: String = isbn
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if ISBN_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(AppError::Validation(format!("Invalid ISBN: {}", isbn)))
    }
}

/// Only PDF uploads are accepted
pub fn is_pdf_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Reduce a client-supplied file name to a safe basename
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let basename = filename.rsplit(&['/', '\\'][..]).next().unwrap_or(filename);

    let cleaned: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Name a PDF is stored under: `{isbn}_{filename}`, with the stem shortened
/// so the whole name fits in [`MAX_FIELD_LEN`] bytes
pub fn stored_file_name(isbn: &str, filename: &str) -> String {
    let name = format!("{}_{}", isbn, filename);
    if name.len() <= MAX_FIELD_LEN {
        return name;
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name.as_str(), ""));
    let keep = MAX_FIELD_LEN.saturating_sub(ext.len() + 1);
    // Sanitized names are ASCII, so any byte index is a char boundary
    let stem = stem.get(..keep).unwrap_or(stem);
    format!("{}.{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_isbn() {
        assert_eq!(normalize_isbn("978-2-07-040850-4").unwrap(), "9782070408504");
        assert_eq!(normalize_isbn("2 07 040850 4").unwrap(), "2070408504");
        assert_eq!(normalize_isbn("0-8044-2957-x").unwrap(), "080442957X");
        assert!(normalize_isbn("12345").is_err());
        assert!(normalize_isbn("97820704085041").is_err());
    }

    #[test]
    fn test_is_pdf_filename() {
        assert!(is_pdf_filename("book.pdf"));
        assert!(is_pdf_filename("Book.PDF"));
        assert!(is_pdf_filename("a.b.pdf"));
        assert!(!is_pdf_filename("book.epub"));
        assert!(!is_pdf_filename("pdf"));
        assert!(!is_pdf_filename(".pdf"));
        assert!(!is_pdf_filename(""));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my book.pdf").as_deref(), Some("my_book.pdf"));
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("C:\\docs\\a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(sanitize_filename("..hidden.pdf").as_deref(), Some("hidden.pdf"));
        assert_eq!(sanitize_filename("/"), None);
    }

    #[test]
    fn test_stored_file_name() {
        assert_eq!(stored_file_name("2070408504", "a.pdf"), "2070408504_a.pdf");

        let long = format!("{}.pdf", "f".repeat(245));
        let stored = stored_file_name("9782070408504", &long);
        assert_eq!(stored.len(), MAX_FIELD_LEN);
        assert!(stored.starts_with("9782070408504_fff"));
        assert!(stored.ends_with("f.pdf"));
    }
}
