//! Catalog management service: sections, e-books and browsing

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        ebook::{
            is_pdf_filename, normalize_isbn, sanitize_filename, stored_file_name, EBook,
            EBookDetails, EBookListing, EBookUpload, NewEBook, SearchResults, UpdateEBook,
            MAX_FIELD_LEN,
        },
        feedback::RateBook,
        section::{CreateSection, Section, SectionWithBooks, UpdateSection},
    },
    repository::{contains_pattern, Repository},
    services::{
        cache::{cached, invalidate, Cache, CacheKey},
        storage::FileStore,
    },
};

/// Keys holding section data
const SECTION_KEYS: [CacheKey; 3] = [
    CacheKey::AllSections,
    CacheKey::DashboardStats,
    CacheKey::SectionsWithBooks,
];

/// Keys holding e-book data
const EBOOK_KEYS: [CacheKey; 2] = [CacheKey::SectionsWithBooks, CacheKey::DashboardStats];

fn with_issued_books(base: &[CacheKey], users: &[i32]) -> Vec<CacheKey> {
    base.iter()
        .copied()
        .chain(users.iter().map(|&user_id| CacheKey::IssuedBooks { user_id }))
        .collect()
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    cache: Arc<dyn Cache>,
    files: FileStore,
}

impl CatalogService {
    pub fn new(repository: Repository, cache: Arc<dyn Cache>, files: FileStore) -> Self {
        Self {
            repository,
            cache,
            files,
        }
    }

    // Sections

    /// All sections (cached)
    pub async fn list_sections(&self) -> AppResult<Vec<Section>> {
        cached(self.cache.as_ref(), CacheKey::AllSections, || {
            self.repository.sections.list()
        })
        .await
    }

    pub async fn get_section(&self, id: i32) -> AppResult<Section> {
        self.repository.sections.get_by_id(id).await
    }

    pub async fn create_section(&self, data: CreateSection) -> AppResult<Section> {
        let section = self.repository.sections.create(&data).await?;
        invalidate(self.cache.as_ref(), &SECTION_KEYS).await?;
        tracing::info!(section_id = section.id, "Section created: {}", section.name);
        Ok(section)
    }

    pub async fn update_section(&self, id: i32, data: UpdateSection) -> AppResult<Section> {
        let section = self.repository.sections.update(id, &data).await?;
        invalidate(self.cache.as_ref(), &SECTION_KEYS).await?;
        Ok(section)
    }

    /// Delete a section together with its e-books
    pub async fn delete_section(&self, id: i32) -> AppResult<()> {
        let borrowers = self.repository.sections.delete(id).await?;
        invalidate(
            self.cache.as_ref(),
            &with_issued_books(&SECTION_KEYS, &borrowers),
        )
        .await?;
        tracing::info!(section_id = id, "Section deleted");
        Ok(())
    }

    /// E-books of a section, as listed for librarians
    pub async fn section_ebooks(&self, section_id: i32) -> AppResult<Vec<EBookListing>> {
        self.repository.ebooks.list_by_section(section_id).await
    }

    /// Sections with their e-books (cached)
    pub async fn sections_with_books(&self) -> AppResult<Vec<SectionWithBooks>> {
        cached(self.cache.as_ref(), CacheKey::SectionsWithBooks, || {
            self.repository.sections.list_with_books()
        })
        .await
    }

    // E-books

    pub async fn ebook_details(&self, id: i32) -> AppResult<EBookDetails> {
        self.repository.ebooks.get_details(id).await
    }

    /// Store an uploaded PDF and create its catalog record
    pub async fn upload_ebook(&self, upload: EBookUpload) -> AppResult<EBook> {
        let (isbn, stored_name) = check_upload(&upload)?;

        if !self.repository.sections.exists(upload.section_id).await? {
            return Err(AppError::NotFound(format!(
                "Section with id {} not found",
                upload.section_id
            )));
        }
        if self.repository.ebooks.isbn_exists(&isbn).await? {
            return Err(AppError::Conflict(format!(
                "An e-book with ISBN {} already exists",
                isbn
            )));
        }

        self.files.save(&stored_name, &upload.bytes).await?;

        let record = NewEBook {
            title: upload.title.trim().to_string(),
            content: stored_name.clone(),
            authors: upload.authors.trim().to_string(),
            isbn,
            section_id: upload.section_id,
            description: upload.description,
        };
        let ebook = match self.repository.ebooks.create(&record).await {
            Ok(ebook) => ebook,
            Err(e) => {
                if let Err(cleanup) = self.files.remove(&stored_name).await {
                    tracing::warn!("Failed to remove orphan upload {}: {}", stored_name, cleanup);
                }
                return Err(e);
            }
        };

        invalidate(self.cache.as_ref(), &EBOOK_KEYS).await?;
        tracing::info!(ebook_id = ebook.id, "EBook uploaded: {}", ebook.title);
        Ok(ebook)
    }

    pub async fn update_ebook(&self, id: i32, data: UpdateEBook) -> AppResult<EBook> {
        let (ebook, borrowers) = self.repository.ebooks.update(id, &data).await?;
        invalidate(
            self.cache.as_ref(),
            &with_issued_books(&EBOOK_KEYS, &borrowers),
        )
        .await?;
        Ok(ebook)
    }

    /// Delete an e-book, its requests, its feedback and its stored file
    pub async fn delete_ebook(&self, id: i32) -> AppResult<()> {
        let ebook = self.repository.ebooks.get_by_id(id).await?;
        let borrowers = self.repository.ebooks.delete(id).await?;
        invalidate(
            self.cache.as_ref(),
            &with_issued_books(&EBOOK_KEYS, &borrowers),
        )
        .await?;

        if let Err(e) = self.files.remove(&ebook.content).await {
            tracing::warn!("Failed to remove file {} of ebook {}: {}", ebook.content, id, e);
        }
        tracing::info!(ebook_id = id, "EBook deleted");
        Ok(())
    }

    /// Record a user's rating and return the e-book's new average
    pub async fn rate_ebook(&self, user_id: i32, data: RateBook) -> AppResult<f64> {
        let (_, average) = self
            .repository
            .feedback
            .rate(user_id, data.ebook_id, data.rating, data.comment.as_deref())
            .await?;
        tracing::info!(
            user_id,
            ebook_id = data.ebook_id,
            "Rating {} recorded, average now {:.2}",
            data.rating,
            average
        );
        Ok(average)
    }

    /// Bytes of an uploaded file
    pub async fn read_upload(&self, filename: &str) -> AppResult<Vec<u8>> {
        self.files.read(filename).await
    }

    /// Case-insensitive substring search over section names and e-book
    /// title, authors and ISBN
    pub async fn search(&self, query: &str) -> AppResult<SearchResults> {
        let pattern = contains_pattern(query.trim());
        let sections = self.repository.sections.search(&pattern).await?;
        let ebooks = self.repository.ebooks.search(&pattern).await?;
        Ok(SearchResults { sections, ebooks })
    }

    /// Section and e-book totals
    pub async fn totals(&self) -> AppResult<(i64, i64)> {
        let sections = self.repository.sections.count().await?;
        let ebooks = self.repository.ebooks.count().await?;
        Ok((sections, ebooks))
    }
}

/// Field checks that need no database; returns the ISBN and stored file name
fn check_upload(upload: &EBookUpload) -> AppResult<(String, String)> {
    let (title, authors) = (upload.title.trim(), upload.authors.trim());
    if title.is_empty() || authors.is_empty() {
        return Err(AppError::Validation(
            "Title and authors are required".to_string(),
        ));
    }
    if title.chars().count() > MAX_FIELD_LEN || authors.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::Validation(format!(
            "Title and authors must be at most {} characters",
            MAX_FIELD_LEN
        )));
    }
    if upload.bytes.is_empty() {
        return Err(AppError::Validation("No selected file".to_string()));
    }
    let filename = sanitize_filename(&upload.filename)
        .ok_or_else(|| AppError::Validation("No selected file".to_string()))?;
    if !is_pdf_filename(&filename) {
        return Err(AppError::Validation("File type not allowed".to_string()));
    }
    let isbn = normalize_isbn(&upload.isbn)?;

    // ISBNs are unique, so prefixing keeps stored names distinct
    let stored_name = stored_file_name(&isbn, &filename);
    Ok((isbn, stored_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_issued_books() {
        let keys = with_issued_books(&EBOOK_KEYS, &[3, 9]);
        assert_eq!(
            keys,
            vec![
                CacheKey::SectionsWithBooks,
                CacheKey::DashboardStats,
                CacheKey::IssuedBooks { user_id: 3 },
                CacheKey::IssuedBooks { user_id: 9 },
            ]
        );
        assert_eq!(with_issued_books(&SECTION_KEYS, &[]).len(), 3);
    }

    #[test]
    fn test_section_writes_cover_browse_keys() {
        assert!(SECTION_KEYS.contains(&CacheKey::AllSections));
        assert!(SECTION_KEYS.contains(&CacheKey::SectionsWithBooks));
        assert!(SECTION_KEYS.contains(&CacheKey::DashboardStats));
        assert!(EBOOK_KEYS.contains(&CacheKey::SectionsWithBooks));
    }

    fn upload() -> EBookUpload {
        EBookUpload {
            title: "Dune".to_string(),
            authors: "Frank Herbert".to_string(),
            isbn: "978-0-441-17271-9".to_string(),
            section_id: 1,
            filename: "dune.pdf".to_string(),
            bytes: b"%PDF-1.4".to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_upload_accepts_valid_form() {
        let (isbn, stored) = check_upload(&upload()).unwrap();
        assert_eq!(isbn, "9780441172719");
        assert_eq!(stored, "9780441172719_dune.pdf");
    }

    #[test]
    fn test_check_upload_rejects_long_fields() {
        let long_title = EBookUpload {
            title: "t".repeat(300),
            ..upload()
        };
        assert!(matches!(
            check_upload(&long_title),
            Err(AppError::Validation(_))
        ));

        let long_authors = EBookUpload {
            authors: "a".repeat(MAX_FIELD_LEN + 1),
            ..upload()
        };
        assert!(matches!(
            check_upload(&long_authors),
            Err(AppError::Validation(_))
        ));

        let at_limit = EBookUpload {
            title: "t".repeat(MAX_FIELD_LEN),
            ..upload()
        };
        assert!(check_upload(&at_limit).is_ok());
    }

    #[test]
    fn test_check_upload_caps_stored_name() {
        let form = EBookUpload {
            filename: format!("{}.pdf", "f".repeat(245)),
            ..upload()
        };
        let (_, stored) = check_upload(&form).unwrap();
        assert_eq!(stored.len(), MAX_FIELD_LEN);
        assert!(stored.ends_with(".pdf"));
    }

    #[test]
    fn test_check_upload_rejects_non_pdf() {
        let form = EBookUpload {
            filename: "dune.epub".to_string(),
            ..upload()
        };
        assert!(matches!(check_upload(&form), Err(AppError::Validation(_))));
    }
}
