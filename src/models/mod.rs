//! Data models for Libris

pub mod book_request;
pub mod ebook;
pub mod feedback;
pub mod section;
pub mod stats;
pub mod user;

// Re-export commonly used types
pub use book_request::{BookRequest, IssuedBook, RequestState};
pub use ebook::{EBook, EBookDetails, EBookShort};
pub use feedback::Feedback;
pub use section::{Section, SectionWithBooks};
pub use stats::DashboardStats;
pub use user::{Caller, RoleName, User};
