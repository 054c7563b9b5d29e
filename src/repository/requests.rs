//! Book requests repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book_request::{
        can_request_more, BookRequest, DueLoan, GrantedLoan, IssuedBook, RequestExportRow,
    },
};

/// Requests counted against the borrowing cap
const COUNT_PENDING: &str = "SELECT COUNT(*) FROM book_requests \
     WHERE user_id = $1 AND NOT is_granted AND date_returned IS NULL";

#[derive(Clone)]
pub struct RequestsRepository {
    pool: Pool<Postgres>,
}

impl RequestsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get request by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<BookRequest> {
        sqlx::query_as::<_, BookRequest>("SELECT * FROM book_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request with id {} not found", id)))
    }

    /// All requests, oldest first
    pub async fn list_all(&self) -> AppResult<Vec<BookRequest>> {
        let requests =
            sqlx::query_as::<_, BookRequest>("SELECT * FROM book_requests ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(requests)
    }

    /// File a pending request.
    ///
    /// The user row is locked for the duration of the count and insert, so two
    /// concurrent requests from the same user cannot both pass the cap check.
    pub async fn create_pending(&self, user_id: i32, ebook_id: i32) -> AppResult<BookRequest> {
        let mut tx = self.pool.begin().await?;

        let max_books: i32 = sqlx::query_scalar("SELECT max_books FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        let ebook_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ebooks WHERE id = $1)")
                .bind(ebook_id)
                .fetch_one(&mut *tx)
                .await?;
        if !ebook_exists {
            return Err(AppError::NotFound(format!(
                "EBook with id {} not found",
                ebook_id
            )));
        }

        let pending: i64 = sqlx::query_scalar(COUNT_PENDING)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        if !can_request_more(pending, max_books) {
            return Err(AppError::Capacity(format!(
                "You have already requested {} books. Please wait until some are granted.",
                max_books
            )));
        }

        let request = sqlx::query_as::<_, BookRequest>(
            r#"
            INSERT INTO book_requests (user_id, ebook_id, date_requested)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(ebook_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// Lock a request, apply a lifecycle transition and persist the result
    pub async fn transition<F>(&self, id: i32, apply: F) -> AppResult<BookRequest>
    where
        F: FnOnce(&mut BookRequest) -> AppResult<()>,
    {
        let mut tx = self.pool.begin().await?;

        let mut request =
            sqlx::query_as::<_, BookRequest>("SELECT * FROM book_requests WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Request with id {} not found", id)))?;

        apply(&mut request)?;
        Self::store_lifecycle(&mut tx, &request).await?;

        tx.commit().await?;
        Ok(request)
    }

    /// End the caller's granted loan of a book
    pub async fn return_for(
        &self,
        user_id: i32,
        ebook_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BookRequest> {
        let mut tx = self.pool.begin().await?;

        let mut request = sqlx::query_as::<_, BookRequest>(
            r#"
            SELECT * FROM book_requests
            WHERE user_id = $1 AND ebook_id = $2 AND is_granted
            ORDER BY date_granted, id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(ebook_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("No granted request found for this book".to_string()))?;

        request.end_loan(now)?;
        Self::store_lifecycle(&mut tx, &request).await?;

        tx.commit().await?;
        Ok(request)
    }

    async fn store_lifecycle(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        request: &BookRequest,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE book_requests
            SET is_granted = $2, date_granted = $3, date_due = $4, date_returned = $5
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(request.is_granted)
        .bind(request.date_granted)
        .bind(request.date_due)
        .bind(request.date_returned)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Hard delete, whatever the state. Returns the deleted row.
    pub async fn delete(&self, id: i32) -> AppResult<BookRequest> {
        sqlx::query_as::<_, BookRequest>("DELETE FROM book_requests WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request with id {} not found", id)))
    }

    /// Number of pending requests of a user
    pub async fn count_pending(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(COUNT_PENDING)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Latest pending or granted request of a user for a book
    pub async fn latest_outstanding(
        &self,
        user_id: i32,
        ebook_id: i32,
    ) -> AppResult<Option<BookRequest>> {
        let request = sqlx::query_as::<_, BookRequest>(
            r#"
            SELECT * FROM book_requests
            WHERE user_id = $1 AND ebook_id = $2 AND date_returned IS NULL
            ORDER BY date_requested DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(ebook_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    /// Books currently on loan to a user
    pub async fn issued_books(&self, user_id: i32) -> AppResult<Vec<IssuedBook>> {
        let books = sqlx::query_as::<_, IssuedBook>(
            r#"
            SELECT e.id, e.title, e.authors, br.date_granted, br.date_due
            FROM book_requests br
            JOIN ebooks e ON e.id = br.ebook_id
            WHERE br.user_id = $1 AND br.is_granted
            ORDER BY br.date_granted, br.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Granted loans falling due inside `[from, to]`
    pub async fn due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<DueLoan>> {
        let loans = sqlx::query_as::<_, DueLoan>(
            r#"
            SELECT br.id AS request_id, u.id AS user_id, u.username, u.email,
                   e.title, br.date_due
            FROM book_requests br
            JOIN users u ON u.id = br.user_id
            JOIN ebooks e ON e.id = br.ebook_id
            WHERE br.is_granted AND br.date_due BETWEEN $1 AND $2
            ORDER BY u.id, br.date_due
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Granted loans whose grant falls inside `[from, to]`
    pub async fn granted_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<GrantedLoan>> {
        let loans = sqlx::query_as::<_, GrantedLoan>(
            r#"
            SELECT br.id AS request_id, u.username, e.title, br.date_granted, br.date_due
            FROM book_requests br
            JOIN users u ON u.id = br.user_id
            JOIN ebooks e ON e.id = br.ebook_id
            WHERE br.is_granted AND br.date_granted BETWEEN $1 AND $2
            ORDER BY br.date_granted
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Every request joined with its user and book
    pub async fn export_rows(&self) -> AppResult<Vec<RequestExportRow>> {
        let rows = sqlx::query_as::<_, RequestExportRow>(
            r#"
            SELECT br.id, u.username, e.title, e.authors, e.content,
                   br.date_requested, br.date_granted, br.date_due, br.date_returned
            FROM book_requests br
            JOIN users u ON u.id = br.user_id
            JOIN ebooks e ON e.id = br.ebook_id
            ORDER BY br.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Count requests
    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_requests")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
