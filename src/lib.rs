//! Libris Library Server
//!
//! REST JSON API for an e-book lending library: sections and e-books managed
//! by librarians, a request/grant/return borrowing workflow for users, and
//! background reminder, report and CSV export jobs.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub jobs: jobs::JobRunner,
}
