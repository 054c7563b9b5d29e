//! Borrowing workflow: book requests from filing to return

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::AppResult,
    models::book_request::{
        can_request_more, BookRequest, IssuedBook, RequestLimit, RequestStatus,
    },
    repository::Repository,
    services::cache::{cached, invalidate, Cache, CacheKey},
};

/// Keys to drop after a request of `user_id` changes
pub fn request_keys(user_id: i32) -> [CacheKey; 2] {
    [CacheKey::IssuedBooks { user_id }, CacheKey::DashboardStats]
}

#[derive(Clone)]
pub struct BorrowingService {
    repository: Repository,
    cache: Arc<dyn Cache>,
}

impl BorrowingService {
    pub fn new(repository: Repository, cache: Arc<dyn Cache>) -> Self {
        Self { repository, cache }
    }

    async fn invalidate_for(&self, user_id: i32) -> AppResult<()> {
        invalidate(self.cache.as_ref(), &request_keys(user_id)).await
    }

    /// File a pending request for a book
    pub async fn request_book(&self, user_id: i32, ebook_id: i32) -> AppResult<BookRequest> {
        let request = self
            .repository
            .requests
            .create_pending(user_id, ebook_id)
            .await?;
        self.invalidate_for(user_id).await?;
        tracing::info!(
            request_id = request.id,
            user_id,
            ebook_id,
            "Book requested"
        );
        Ok(request)
    }

    /// Librarian grants a pending request
    pub async fn grant(&self, request_id: i32) -> AppResult<BookRequest> {
        let now = Utc::now();
        let request = self
            .repository
            .requests
            .transition(request_id, |r| r.grant(now))
            .await?;
        self.invalidate_for(request.user_id).await?;
        tracing::info!(request_id, user_id = request.user_id, "Request granted");
        Ok(request)
    }

    /// Librarian ends a granted loan
    pub async fn revoke(&self, request_id: i32) -> AppResult<BookRequest> {
        let now = Utc::now();
        let request = self
            .repository
            .requests
            .transition(request_id, |r| r.end_loan(now))
            .await?;
        self.invalidate_for(request.user_id).await?;
        tracing::info!(request_id, user_id = request.user_id, "Request revoked");
        Ok(request)
    }

    /// User returns a book they hold
    pub async fn return_book(&self, user_id: i32, ebook_id: i32) -> AppResult<BookRequest> {
        let request = self
            .repository
            .requests
            .return_for(user_id, ebook_id, Utc::now())
            .await?;
        self.invalidate_for(user_id).await?;
        tracing::info!(request_id = request.id, user_id, ebook_id, "Book returned");
        Ok(request)
    }

    /// Hard delete, whatever the state
    pub async fn delete(&self, request_id: i32) -> AppResult<()> {
        let request = self.repository.requests.delete(request_id).await?;
        self.invalidate_for(request.user_id).await?;
        tracing::info!(request_id, user_id = request.user_id, "Request deleted");
        Ok(())
    }

    pub async fn list_all(&self) -> AppResult<Vec<BookRequest>> {
        self.repository.requests.list_all().await
    }

    /// Whether the user may file another request
    pub async fn limit(&self, user_id: i32) -> AppResult<RequestLimit> {
        let user = self.repository.users.get_by_id(user_id).await?;
        let pending = self.repository.requests.count_pending(user_id).await?;
        Ok(RequestLimit {
            can_request_more: can_request_more(pending, user.max_books),
            pending,
            max_books: user.max_books,
        })
    }

    /// State of the user's latest outstanding request for a book
    pub async fn status(&self, user_id: i32, ebook_id: i32) -> AppResult<RequestStatus> {
        let latest = self
            .repository
            .requests
            .latest_outstanding(user_id, ebook_id)
            .await?;
        Ok(match latest {
            Some(request) => RequestStatus {
                is_requested: true,
                is_granted: request.is_granted,
            },
            None => RequestStatus {
                is_requested: false,
                is_granted: false,
            },
        })
    }

    /// Books on loan to the user (cached per user)
    pub async fn issued_books(&self, user_id: i32) -> AppResult<Vec<IssuedBook>> {
        cached(
            self.cache.as_ref(),
            CacheKey::IssuedBooks { user_id },
            || self.repository.requests.issued_books(user_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_keys_target_owner() {
        let keys = request_keys(12);
        assert_eq!(keys[0].key(), "issued_books:12");
        assert_eq!(keys[1], CacheKey::DashboardStats);
        // the read path for the same user uses the same key
        assert_eq!(keys[0].key(), CacheKey::IssuedBooks { user_id: 12 }.key());
    }
}
