//! Monthly activity report sent to the library operator

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::AppResult,
    models::{book_request::GrantedLoan, feedback::FeedbackSummary},
    repository::Repository,
    services::email::{Mailer, OutgoingMail},
};

/// Length of the reporting window
pub const REPORT_WINDOW_DAYS: i64 = 30;

/// Figures covered by one report
#[derive(Debug, Clone)]
pub struct MonthlyReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_sections: i64,
    pub total_ebooks: i64,
    pub feedback: Vec<FeedbackSummary>,
    pub loans: Vec<GrantedLoan>,
}

/// Minimal HTML escaping for values interpolated into the report
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn day(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn render_html(report: &MonthlyReport) -> String {
    let mut html = String::from("<html><body>\n<h1>Monthly Library Report</h1>\n");
    html.push_str(&format!(
        "<p>Period: {} to {}</p>\n<p>Sections: {} &middot; E-books: {}</p>\n",
        day(report.from),
        day(report.to),
        report.total_sections,
        report.total_ebooks
    ));

    html.push_str("<h2>Ratings</h2>\n");
    if report.feedback.is_empty() {
        html.push_str("<p>No ratings this period.</p>\n");
    } else {
        html.push_str("<table>\n<tr><th>User</th><th>Book</th><th>Average rating</th></tr>\n");
        for row in &report.feedback {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td></tr>\n",
                escape(&row.username),
                escape(&row.title),
                row.avg_rating
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("<h2>Books issued</h2>\n");
    if report.loans.is_empty() {
        html.push_str("<p>No books issued this period.</p>\n");
    } else {
        html.push_str("<table>\n<tr><th>User</th><th>Book</th><th>Issued</th><th>Due</th></tr>\n");
        for loan in &report.loans {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&loan.username),
                escape(&loan.title),
                day(loan.date_granted),
                loan.date_due.map(day).unwrap_or_default()
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body></html>\n");
    html
}

/// Gather the last 30 days of activity and mail it to `recipient`
pub async fn run(
    repository: &Repository,
    mailer: &dyn Mailer,
    recipient: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let from = now - Duration::days(REPORT_WINDOW_DAYS);

    let report = MonthlyReport {
        from,
        to: now,
        total_sections: repository.sections.count().await?,
        total_ebooks: repository.ebooks.count().await?,
        feedback: repository.feedback.summaries_between(from, now).await?,
        loans: repository.requests.granted_between(from, now).await?,
    };

    let mail = OutgoingMail {
        html_body: Some(render_html(&report)),
        ..OutgoingMail::text(
            recipient,
            "Monthly Library Report",
            format!(
                "Monthly library report for {} to {}: {} ratings, {} books issued.",
                day(report.from),
                day(report.to),
                report.feedback.len(),
                report.loans.len()
            ),
        )
    };
    mailer.send(mail).await?;

    tracing::info!(
        ratings = report.feedback.len(),
        loans = report.loans.len(),
        "Monthly report sent to {}",
        recipient
    );
    Ok(())
}
