//! Sections repository for database operations

use std::collections::HashMap;

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        ebook::EBookShort,
        section::{CreateSection, Section, SectionRef, SectionWithBooks, UpdateSection},
    },
};

#[derive(Clone)]
pub struct SectionsRepository {
    pool: Pool<Postgres>,
}

impl SectionsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List all sections
    pub async fn list(&self) -> AppResult<Vec<Section>> {
        let sections = sqlx::query_as::<_, Section>("SELECT * FROM sections ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sections)
    }

    /// Get section by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Section> {
        sqlx::query_as::<_, Section>("SELECT * FROM sections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Section with id {} not found", id)))
    }

    /// Create a new section
    pub async fn create(&self, section: &CreateSection) -> AppResult<Section> {
        let created = sqlx::query_as::<_, Section>(
            "INSERT INTO sections (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(&section.name)
        .bind(&section.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update a section, keeping fields that are not provided
    pub async fn update(&self, id: i32, section: &UpdateSection) -> AppResult<Section> {
        sqlx::query_as::<_, Section>(
            r#"
            UPDATE sections
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                date_created = COALESCE($4, date_created)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&section.name)
        .bind(&section.description)
        .bind(section.date_created)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Section with id {} not found", id)))
    }

    /// Delete a section with its e-books (and, transitively, their requests and
    /// feedback). Returns the users that had a granted loan in the section.
    pub async fn delete(&self, id: i32) -> AppResult<Vec<i32>> {
        let mut tx = self.pool.begin().await?;

        let borrowers: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT br.user_id
            FROM book_requests br
            JOIN ebooks e ON e.id = br.ebook_id
            WHERE e.section_id = $1 AND br.is_granted
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM sections WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Section with id {} not found", id)));
        }

        tx.commit().await?;
        Ok(borrowers)
    }

    /// All sections with their e-books
    pub async fn list_with_books(&self) -> AppResult<Vec<SectionWithBooks>> {
        let sections = self.list().await?;

        let rows = sqlx::query_as::<_, (i32, String, String, String, i32)>(
            "SELECT id, title, authors, isbn, section_id FROM ebooks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_section: HashMap<i32, Vec<EBookShort>> = HashMap::new();
        for (id, title, authors, isbn, section_id) in rows {
            by_section.entry(section_id).or_default().push(EBookShort {
                id,
                title,
                authors,
                isbn,
            });
        }

        Ok(sections
            .into_iter()
            .map(|s| SectionWithBooks {
                ebooks: by_section.remove(&s.id).unwrap_or_default(),
                id: s.id,
                name: s.name,
            })
            .collect())
    }

    /// Sections whose name contains the pattern
    pub async fn search(&self, pattern: &str) -> AppResult<Vec<SectionRef>> {
        let sections = sqlx::query_as::<_, SectionRef>(
            "SELECT id, name FROM sections WHERE name ILIKE $1 ORDER BY id",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(sections)
    }

    /// Check whether a section exists
    pub async fn exists(&self, id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sections WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Count sections
    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
