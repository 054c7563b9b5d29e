//! Business logic services

pub mod borrowing;
pub mod cache;
pub mod catalog;
pub mod email;
pub mod redis;
pub mod stats;
pub mod storage;
pub mod users;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    repository::Repository,
    services::{cache::Cache, email::Mailer},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub borrowing: borrowing::BorrowingService,
    pub stats: stats::StatsService,
    pub repository: Repository,
    pub cache: Arc<dyn Cache>,
    pub mailer: Arc<dyn Mailer>,
}

impl Services {
    /// Create all services around one repository, cache and mail transport
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        cache: Arc<dyn Cache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let files = storage::FileStore::new(config.storage.upload_dir.clone());

        Self {
            users: users::UsersService::new(repository.clone(), config.auth.clone(), cache.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), cache.clone(), files),
            borrowing: borrowing::BorrowingService::new(repository.clone(), cache.clone()),
            stats: stats::StatsService::new(repository.clone(), cache.clone()),
            repository,
            cache,
            mailer,
        }
    }
}
