//! Librarian dashboard aggregates

use std::sync::Arc;

use crate::{
    error::AppResult,
    models::stats::DashboardStats,
    repository::Repository,
    services::cache::{cached, Cache, CacheKey},
};

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    cache: Arc<dyn Cache>,
}

impl StatsService {
    pub fn new(repository: Repository, cache: Arc<dyn Cache>) -> Self {
        Self { repository, cache }
    }

    /// Library totals and the section list (cached)
    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        cached(self.cache.as_ref(), CacheKey::DashboardStats, || self.compute())
            .await
    }

    async fn compute(&self) -> AppResult<DashboardStats> {
        Ok(DashboardStats {
            total_users: self.repository.users.count().await?,
            total_requests: self.repository.requests.count().await?,
            total_ebooks: self.repository.ebooks.count().await?,
            total_sections: self.repository.sections.count().await?,
            sections: self.repository.sections.list().await?,
        })
    }
}
