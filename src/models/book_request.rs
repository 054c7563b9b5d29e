//! Book request (borrow lifecycle) model
//!
//! A request moves `Pending -> Granted -> Returned`. Librarians grant and
//! revoke, users return their own loans, and a librarian may hard-delete a
//! request in any state. A returned request is never granted again; borrowing
//! the same book again needs a new request.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Fixed loan period applied when a request is granted
pub const LOAN_PERIOD_DAYS: i64 = 7;

/// Lifecycle state, derived from the stored columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Granted,
    Returned,
}

/// Book request row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookRequest {
    pub id: i32,
    pub user_id: i32,
    pub ebook_id: i32,
    pub date_requested: DateTime<Utc>,
    pub is_granted: bool,
    pub date_granted: Option<DateTime<Utc>>,
    pub date_due: Option<DateTime<Utc>>,
    pub date_returned: Option<DateTime<Utc>>,
}

/// Due timestamp for a loan granted at `granted`
pub fn due_date(granted: DateTime<Utc>) -> DateTime<Utc> {
    granted + Duration::days(LOAN_PERIOD_DAYS)
}

/// Whether a user with `pending` outstanding requests may file another
pub fn can_request_more(pending: i64, max_books: i32) -> bool {
    pending < i64::from(max_books)
}

impl BookRequest {
    pub fn state(&self) -> RequestState {
        if self.is_granted {
            RequestState::Granted
        } else if self.date_returned.is_some() {
            RequestState::Returned
        } else {
            RequestState::Pending
        }
    }

    /// Pending -> Granted, starting the loan period at `now`
    pub fn grant(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        match self.state() {
            RequestState::Pending => {
                self.is_granted = true;
                self.date_granted = Some(now);
                self.date_due = Some(due_date(now));
                Ok(())
            }
            RequestState::Granted => Err(AppError::InvalidTransition(format!(
                "Request {} is already granted",
                self.id
            ))),
            RequestState::Returned => Err(AppError::InvalidTransition(format!(
                "Request {} has been returned and cannot be granted again",
                self.id
            ))),
        }
    }

    /// Granted -> Returned; used by both librarian revoke and user return
    pub fn end_loan(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        match self.state() {
            RequestState::Granted => {
                self.is_granted = false;
                self.date_returned = Some(now);
                Ok(())
            }
            RequestState::Pending => Err(AppError::InvalidTransition(format!(
                "Request {} has not been granted",
                self.id
            ))),
            RequestState::Returned => Err(AppError::InvalidTransition(format!(
                "Request {} has already been returned",
                self.id
            ))),
        }
    }
}

/// User request for a book
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBookRequest {
    #[validate(range(min = 1, message = "EBook ID is required"))]
    pub ebook_id: i32,
}

/// Result of the request limit check
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestLimit {
    pub can_request_more: bool,
    pub pending: i64,
    pub max_books: i32,
}

/// Request status of one book for the caller
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestStatus {
    pub is_requested: bool,
    pub is_granted: bool,
}

/// Book currently on loan to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct IssuedBook {
    pub id: i32,
    pub title: String,
    pub authors: String,
    pub date_granted: Option<DateTime<Utc>>,
    pub date_due: Option<DateTime<Utc>>,
}

/// Granted loan with the borrower's contact details
#[derive(Debug, Clone, FromRow)]
pub struct DueLoan {
    pub request_id: i32,
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub title: String,
    pub date_due: Option<DateTime<Utc>>,
}

/// Request row joined with user and book fields
#[derive(Debug, Clone, FromRow)]
pub struct RequestExportRow {
    pub id: i32,
    pub username: String,
    pub title: String,
    pub authors: String,
    pub content: String,
    pub date_requested: DateTime<Utc>,
    pub date_granted: Option<DateTime<Utc>>,
    pub date_due: Option<DateTime<Utc>>,
    pub date_returned: Option<DateTime<Utc>>,
}

/// Loan granted inside a reporting window
#[derive(Debug, Clone, FromRow)]
pub struct GrantedLoan {
    pub request_id: i32,
    pub username: String,
    pub title: String,
    pub date_granted: DateTime<Utc>,
    pub date_due: Option<DateTime<Utc>>,
}
