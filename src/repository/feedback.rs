//! Feedback repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::feedback::{average_rating, Feedback, FeedbackSummary},
};

#[derive(Clone)]
pub struct FeedbackRepository {
    pool: Pool<Postgres>,
}

impl FeedbackRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Record a rating and refresh the e-book's running average.
    ///
    /// The e-book row is locked so concurrent ratings are averaged one after
    /// the other. Returns the stored feedback and the new average.
    pub async fn rate(
        &self,
        user_id: i32,
        ebook_id: i32,
        rating: i16,
        comment: Option<&str>,
    ) -> AppResult<(Feedback, f64)> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i32>("SELECT id FROM ebooks WHERE id = $1 FOR UPDATE")
            .bind(ebook_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("EBook with id {} not found", ebook_id)))?;

        let feedback = sqlx::query_as::<_, Feedback>(
            r#"
            INSERT INTO feedback (user_id, ebook_id, rating, comment, date_created)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(ebook_id)
        .bind(rating)
        .bind(comment)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let ratings: Vec<i16> =
            sqlx::query_scalar("SELECT rating FROM feedback WHERE ebook_id = $1")
                .bind(ebook_id)
                .fetch_all(&mut *tx)
                .await?;
        let average = average_rating(&ratings);

        sqlx::query("UPDATE ebooks SET rating = $2 WHERE id = $1")
            .bind(ebook_id)
            .bind(average)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((feedback, average))
    }

    /// Average rating per (user, book) for feedback created inside `[from, to]`
    pub async fn summaries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<FeedbackSummary>> {
        let summaries = sqlx::query_as::<_, FeedbackSummary>(
            r#"
            SELECT f.user_id, f.ebook_id, u.username, e.title,
                   AVG(f.rating)::DOUBLE PRECISION AS avg_rating
            FROM feedback f
            JOIN users u ON u.id = f.user_id
            JOIN ebooks e ON e.id = f.ebook_id
            WHERE f.date_created BETWEEN $1 AND $2
            GROUP BY f.user_id, f.ebook_id, u.username, e.title
            ORDER BY u.username, e.title
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }
}
