//! E-books repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::ebook::{EBook, EBookDetails, EBookListing, EBookShort, NewEBook, UpdateEBook},
};

#[derive(Clone)]
pub struct EBooksRepository {
    pool: Pool<Postgres>,
}

impl EBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get e-book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<EBook> {
        sqlx::query_as::<_, EBook>("SELECT * FROM ebooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("EBook with id {} not found", id)))
    }

    /// Public details of an e-book
    pub async fn get_details(&self, id: i32) -> AppResult<EBookDetails> {
        sqlx::query_as::<_, EBookDetails>(
            "SELECT id, title, description, rating FROM ebooks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("EBook with id {} not found", id)))
    }

    /// E-books of one section
    pub async fn list_by_section(&self, section_id: i32) -> AppResult<Vec<EBookListing>> {
        let ebooks = sqlx::query_as::<_, EBookListing>(
            "SELECT id, title, content, authors, isbn FROM ebooks WHERE section_id = $1 ORDER BY id",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ebooks)
    }

    /// Check whether an ISBN is already catalogued
    pub async fn isbn_exists(&self, isbn: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ebooks WHERE isbn = $1)")
            .bind(isbn)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Create a new e-book record
    pub async fn create(&self, ebook: &NewEBook) -> AppResult<EBook> {
        let created = sqlx::query_as::<_, EBook>(
            r#"
            INSERT INTO ebooks (title, content, authors, isbn, section_id, description, date_issued)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&ebook.title)
        .bind(&ebook.content)
        .bind(&ebook.authors)
        .bind(&ebook.isbn)
        .bind(ebook.section_id)
        .bind(&ebook.description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("An e-book with ISBN {} already exists", ebook.isbn))
            }
            other => AppError::Database(other),
        })?;

        Ok(created)
    }

    /// Update an e-book. Returns the record and the users currently borrowing it.
    pub async fn update(&self, id: i32, ebook: &UpdateEBook) -> AppResult<(EBook, Vec<i32>)> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, EBook>(
            r#"
            UPDATE ebooks
            SET title = COALESCE($2, title),
                authors = COALESCE($3, authors),
                description = COALESCE($4, description)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&ebook.title)
        .bind(&ebook.authors)
        .bind(&ebook.description)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("EBook with id {} not found", id)))?;

        let borrowers = Self::borrowers(&mut tx, id).await?;

        tx.commit().await?;
        Ok((updated, borrowers))
    }

    /// Delete an e-book with its requests and feedback. Returns the users that
    /// were borrowing it.
    pub async fn delete(&self, id: i32) -> AppResult<Vec<i32>> {
        let mut tx = self.pool.begin().await?;

        let borrowers = Self::borrowers(&mut tx, id).await?;

        let deleted = sqlx::query("DELETE FROM ebooks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("EBook with id {} not found", id)));
        }

        tx.commit().await?;
        Ok(borrowers)
    }

    async fn borrowers(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        ebook_id: i32,
    ) -> AppResult<Vec<i32>> {
        let users: Vec<i32> = sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM book_requests WHERE ebook_id = $1 AND is_granted",
        )
        .bind(ebook_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(users)
    }

    /// E-books whose title, authors or ISBN contains the pattern
    pub async fn search(&self, pattern: &str) -> AppResult<Vec<EBookShort>> {
        let ebooks = sqlx::query_as::<_, EBookShort>(
            r#"
            SELECT id, title, authors, isbn
            FROM ebooks
            WHERE title ILIKE $1 OR authors ILIKE $1 OR isbn ILIKE $1
            ORDER BY id
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(ebooks)
    }

    /// Count e-books
    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebooks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
