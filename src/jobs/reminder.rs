//! Daily reminder of loans falling due soon

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::AppResult,
    models::book_request::DueLoan,
    repository::Repository,
    services::email::{Mailer, OutgoingMail},
};

/// Loans due within this many days are included
pub const REMINDER_WINDOW_DAYS: i64 = 2;

/// Everything one user is reminded of
#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub books: Vec<(String, Option<DateTime<Utc>>)>,
}

/// One reminder per user, ordered by user id
pub fn group_by_user(loans: Vec<DueLoan>) -> Vec<Reminder> {
    let mut grouped: BTreeMap<i32, Reminder> = BTreeMap::new();
    for loan in loans {
        grouped
            .entry(loan.user_id)
            .or_insert_with(|| Reminder {
                user_id: loan.user_id,
                username: loan.username.clone(),
                email: loan.email.clone(),
                books: Vec::new(),
            })
            .books
            .push((loan.title, loan.date_due));
    }
    grouped.into_values().collect()
}

pub fn render(reminder: &Reminder) -> OutgoingMail {
    let mut body = format!(
        "Dear {},\n\nYou have books due for return soon:\n",
        reminder.username
    );
    for (title, due) in &reminder.books {
        let due = due
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        body.push_str(&format!("- {}, due by {}\n", title, due));
    }
    OutgoingMail::text(&reminder.email, "Library Reminder", body)
}

/// Send the reminders for loans due in `[now, now + 2 days]`.
///
/// A failed delivery to one user does not stop the others. Returns the number
/// of emails sent.
pub async fn run(repository: &Repository, mailer: &dyn Mailer, now: DateTime<Utc>) -> AppResult<usize> {
    let loans = repository
        .requests
        .due_between(now, now + Duration::days(REMINDER_WINDOW_DAYS))
        .await?;
    let reminders = group_by_user(loans);
    tracing::info!("{} users have books due soon", reminders.len());

    let mut sent = 0;
    for reminder in &reminders {
        match mailer.send(render(reminder)).await {
            Ok(()) => sent += 1,
            Err(e) => tracing::error!(
                user_id = reminder.user_id,
                "Failed to send reminder to {}: {}",
                reminder.email,
                e
            ),
        }
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loan(request_id: i32, user_id: i32, title: &str, day: u32) -> DueLoan {
        DueLoan {
            request_id,
            user_id,
            username: format!("user{}", user_id),
            email: format!("user{}@example.org", user_id),
            title: title.to_string(),
            date_due: Some(Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_group_by_user_aggregates_books() {
        let reminders = group_by_user(vec![
            loan(1, 2, "Dune", 3),
            loan(2, 1, "Emma", 2),
            loan(3, 2, "Ulysses", 4),
        ]);

        assert_eq!(reminders.len(), 2);
        assert_eq!(reminders[0].user_id, 1);
        assert_eq!(reminders[1].user_id, 2);
        assert_eq!(reminders[1].books.len(), 2);
        assert_eq!(reminders[1].books[0].0, "Dune");
        assert_eq!(reminders[1].books[1].0, "Ulysses");
    }

    #[test]
    fn test_group_by_user_empty() {
        assert!(group_by_user(Vec::new()).is_empty());
    }

    #[test]
    fn test_render_lists_due_dates() {
        let reminder = &group_by_user(vec![loan(1, 5, "Dune", 3), loan(2, 5, "Emma", 4)])[0];
        let mail = render(reminder);

        assert_eq!(mail.to, "user5@example.org");
        assert_eq!(mail.subject, "Library Reminder");
        assert!(mail.text_body.starts_with("Dear user5,"));
        assert!(mail.text_body.contains("- Dune, due by 2024-06-03\n"));
        assert!(mail.text_body.contains("- Emma, due by 2024-06-04\n"));
        assert!(mail.attachment.is_none());
    }
}
