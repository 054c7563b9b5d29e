//! Aggregate read models

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::section::Section;

/// Librarian dashboard
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_requests: i64,
    pub total_ebooks: i64,
    pub total_sections: i64,
    pub sections: Vec<Section>,
}
