//! Borrowing workflow tests against a real PostgreSQL database
//!
//! Each test gets a fresh migrated database from `sqlx::test`.
//! Run with: DATABASE_URL=postgres://... cargo test -- --ignored

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use libris_server::{
    config::AppConfig,
    error::{AppError, AppResult},
    jobs::{self, JobContext, JobRunner},
    models::{
        book_request::LOAN_PERIOD_DAYS,
        ebook::{EBook, EBookUpload},
        feedback::RateBook,
        section::CreateSection,
        user::RoleName,
    },
    repository::Repository,
    services::{
        cache::{Cache, CacheKey, MemoryCache},
        email::{Mailer, OutgoingMail},
        Services,
    },
};

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> AppResult<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _mail: OutgoingMail) -> AppResult<()> {
        Err(AppError::Mail("smtp down".to_string()))
    }
}

struct Harness {
    services: Services,
    repository: Repository,
    cache: Arc<MemoryCache>,
    mailer: Arc<RecordingMailer>,
    config: AppConfig,
    _dir: tempfile::TempDir,
}

fn harness(pool: PgPool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.upload_dir = dir.path().join("uploads");
    config.storage.export_dir = dir.path().join("exports");

    let repository = Repository::new(pool);
    let cache = Arc::new(MemoryCache::new());
    let mailer = Arc::new(RecordingMailer::default());
    let services = Services::new(repository.clone(), &config, cache.clone(), mailer.clone());

    Harness {
        services,
        repository,
        cache,
        mailer,
        config,
        _dir: dir,
    }
}

impl Harness {
    async fn user(&self, name: &str) -> i32 {
        self.repository
            .users
            .create(name, &format!("{}@example.org", name), "hash", RoleName::User)
            .await
            .unwrap()
            .id
    }

    async fn section(&self, name: &str) -> i32 {
        self.services
            .catalog
            .create_section(CreateSection {
                name: name.to_string(),
                description: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn ebook(&self, section_id: i32, title: &str, isbn: &str) -> EBook {
        self.services
            .catalog
            .upload_ebook(EBookUpload {
                title: title.to_string(),
                authors: "Jane Austen".to_string(),
                isbn: isbn.to_string(),
                section_id,
                description: None,
                filename: format!("{}.pdf", title.to_lowercase()),
                bytes: b"%PDF-1.4".to_vec(),
            })
            .await
            .unwrap()
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_request_cap_rejects_sixth_request(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("alice").await;
    let section = h.section("Fiction").await;
    let book = h.ebook(section, "Emma", "9780141439587").await;

    // repeated requests for one book are allowed
    for _ in 0..5 {
        h.services.borrowing.request_book(user, book.id).await.unwrap();
    }

    let err = h.services.borrowing.request_book(user, book.id).await.unwrap_err();
    assert!(matches!(err, AppError::Capacity(_)));
    assert_eq!(h.repository.requests.count_pending(user).await.unwrap(), 5);

    let limit = h.services.borrowing.limit(user).await.unwrap();
    assert!(!limit.can_request_more);
    assert_eq!(limit.max_books, 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_cap_scenario_grant_and_return(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("ivan").await;
    let section = h.section("Fiction").await;

    let mut requests = Vec::new();
    for n in 0..5 {
        let book = h.ebook(section, &format!("Book{}", n), &format!("978000000000{}", n)).await;
        requests.push(h.services.borrowing.request_book(user, book.id).await.unwrap());
    }
    let extra = h.ebook(section, "Extra", "9780000000009").await;
    let err = h.services.borrowing.request_book(user, extra.id).await.unwrap_err();
    assert!(matches!(err, AppError::Capacity(_)));

    let first = &requests[0];
    h.services.borrowing.grant(first.id).await.unwrap();
    h.services.borrowing.return_book(user, first.ebook_id).await.unwrap();

    let accepted = h.services.borrowing.request_book(user, extra.id).await.unwrap();
    assert_eq!(accepted.ebook_id, extra.id);
    assert_eq!(h.repository.requests.count_pending(user).await.unwrap(), 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_returned_requests_free_the_cap(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("bob").await;
    let section = h.section("Fiction").await;
    let book = h.ebook(section, "Persuasion", "9780141439686").await;

    let first = h.services.borrowing.request_book(user, book.id).await.unwrap();
    h.services.borrowing.grant(first.id).await.unwrap();
    h.services.borrowing.return_book(user, book.id).await.unwrap();

    assert_eq!(h.repository.requests.count_pending(user).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_request_lifecycle(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("carol").await;
    let section = h.section("Classics").await;
    let book = h.ebook(section, "Emma", "9780141439587").await;

    let status = h.services.borrowing.status(user, book.id).await.unwrap();
    assert!(!status.is_requested);

    let request = h.services.borrowing.request_book(user, book.id).await.unwrap();
    let status = h.services.borrowing.status(user, book.id).await.unwrap();
    assert!(status.is_requested && !status.is_granted);

    // returning a book that was never granted
    let err = h.services.borrowing.return_book(user, book.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let granted = h.services.borrowing.grant(request.id).await.unwrap();
    let granted_at = granted.date_granted.unwrap();
    assert_eq!(granted.date_due, Some(granted_at + Duration::days(LOAN_PERIOD_DAYS)));

    let err = h.services.borrowing.grant(request.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let issued = h.services.borrowing.issued_books(user).await.unwrap();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].title, "Emma");

    let returned = h.services.borrowing.return_book(user, book.id).await.unwrap();
    assert!(returned.date_returned.is_some());
    assert!(!returned.is_granted);

    let err = h.services.borrowing.grant(request.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    let err = h.services.borrowing.revoke(request.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    assert!(h.services.borrowing.issued_books(user).await.unwrap().is_empty());
    let status = h.services.borrowing.status(user, book.id).await.unwrap();
    assert!(!status.is_requested);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_request_for_missing_book(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("dave").await;

    let err = h.services.borrowing.request_book(user, 999).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_grant_invalidates_cached_issued_books(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("erin").await;
    let section = h.section("Poetry").await;
    let book = h.ebook(section, "Odes", "9780140424492").await;

    assert!(h.services.borrowing.issued_books(user).await.unwrap().is_empty());
    let key = CacheKey::IssuedBooks { user_id: user }.key();
    assert!(h.cache.get(&key).await.unwrap().is_some());

    let request = h.services.borrowing.request_book(user, book.id).await.unwrap();
    h.services.borrowing.grant(request.id).await.unwrap();
    assert!(h.cache.get(&key).await.unwrap().is_none());

    let issued = h.services.borrowing.issued_books(user).await.unwrap();
    assert_eq!(issued.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_section_writes_invalidate_listings(pool: PgPool) {
    let h = harness(pool);
    h.section("Science").await;

    assert_eq!(h.services.catalog.list_sections().await.unwrap().len(), 1);
    assert_eq!(h.services.stats.dashboard().await.unwrap().total_sections, 1);

    h.section("History").await;

    assert_eq!(h.services.catalog.list_sections().await.unwrap().len(), 2);
    assert_eq!(h.services.stats.dashboard().await.unwrap().total_sections, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_section_delete_cascades(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("frank").await;
    let section = h.section("Drama").await;
    let book = h.ebook(section, "Hamlet", "9780743477123").await;
    let request = h.services.borrowing.request_book(user, book.id).await.unwrap();
    h.services.borrowing.grant(request.id).await.unwrap();
    assert_eq!(h.services.borrowing.issued_books(user).await.unwrap().len(), 1);
    h.services
        .catalog
        .rate_ebook(
            user,
            RateBook {
                ebook_id: book.id,
                rating: 4,
                comment: Some("Gripping".to_string()),
            },
        )
        .await
        .unwrap();

    h.services.catalog.delete_section(section).await.unwrap();

    assert!(matches!(
        h.repository.ebooks.get_by_id(book.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.repository.requests.get_by_id(request.id).await,
        Err(AppError::NotFound(_))
    ));
    let feedback: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE ebook_id = $1")
        .bind(book.id)
        .fetch_one(&h.repository.pool)
        .await
        .unwrap();
    assert_eq!(feedback, 0);
    // the borrower's cached loans were dropped with the section
    assert!(h.services.borrowing.issued_books(user).await.unwrap().is_empty());

    let err = h.services.catalog.delete_section(section).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_duplicate_isbn_is_rejected(pool: PgPool) {
    let h = harness(pool);
    let section = h.section("Fiction").await;
    h.ebook(section, "Emma", "978-0-14-143958-7").await;

    let err = h
        .services
        .catalog
        .upload_ebook(EBookUpload {
            title: "Emma again".to_string(),
            authors: "Jane Austen".to_string(),
            isbn: "9780141439587".to_string(),
            section_id: section,
            description: None,
            filename: "emma2.pdf".to_string(),
            bytes: b"%PDF-1.4".to_vec(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_ratings_average(pool: PgPool) {
    let h = harness(pool);
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let section = h.section("Fiction").await;
    let book = h.ebook(section, "Emma", "9780141439587").await;

    let book_id = book.id;
    let rate = |user_id: i32, rating: i16| {
        let catalog = h.services.catalog.clone();
        async move {
            catalog
                .rate_ebook(
                    user_id,
                    RateBook {
                        ebook_id: book_id,
                        rating,
                        comment: None,
                    },
                )
                .await
        }
    };
    let (first, second) = tokio::join!(
        tokio::spawn(rate(alice, 3)),
        tokio::spawn(rate(bob, 5)),
    );
    first.unwrap().unwrap();
    second.unwrap().unwrap();

    let stored = h.repository.ebooks.get_by_id(book_id).await.unwrap();
    assert!((stored.rating - 4.0).abs() < f64::EPSILON);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_reminder_mails_due_borrowers(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("grace").await;
    let section = h.section("Fiction").await;
    let book = h.ebook(section, "Emma", "9780141439587").await;
    let request = h.services.borrowing.request_book(user, book.id).await.unwrap();
    h.services.borrowing.grant(request.id).await.unwrap();

    let now = Utc::now();
    assert_eq!(
        jobs::reminder::run(&h.repository, h.mailer.as_ref(), now).await.unwrap(),
        0
    );

    let sent = jobs::reminder::run(&h.repository, h.mailer.as_ref(), now + Duration::days(6))
        .await
        .unwrap();
    assert_eq!(sent, 1);

    let mails = h.mailer.sent();
    assert_eq!(mails[0].to, "grace@example.org");
    assert_eq!(mails[0].subject, "Library Reminder");
    assert!(mails[0].text_body.contains("Emma"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_export_writes_and_mails_csv(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("heidi").await;
    let section = h.section("Fiction").await;
    let book = h.ebook(section, "Emma", "9780141439587").await;
    h.services.borrowing.request_book(user, book.id).await.unwrap();

    let mailer: Arc<dyn Mailer> = h.mailer.clone();
    let runner = JobRunner::start(JobContext::new(h.repository.clone(), mailer, &h.config), 1);
    let path = runner.export_csv("librarian@example.org".to_string()).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("heidi,Emma"));

    let mails = h.mailer.sent();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].to, "librarian@example.org");
    let attachment = mails[0].attachment.as_ref().unwrap();
    assert_eq!(attachment.filename, "book_requests.csv");
    assert_eq!(attachment.bytes, text.into_bytes());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_export_reports_mail_failure(pool: PgPool) {
    let h = harness(pool);
    let user = h.user("ivan").await;
    let section = h.section("Fiction").await;
    let book = h.ebook(section, "Emma", "9780141439587").await;
    h.services.borrowing.request_book(user, book.id).await.unwrap();

    let mailer: Arc<dyn Mailer> = Arc::new(FailingMailer);
    let runner = JobRunner::start(JobContext::new(h.repository.clone(), mailer, &h.config), 1);
    let result = runner.export_csv("librarian@example.org".to_string()).await;

    assert!(matches!(result, Err(AppError::Export(_))));
}
