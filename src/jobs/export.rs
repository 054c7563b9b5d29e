//! CSV export of every book request, mailed to the requesting librarian

use std::{io::Write, path::{Path, PathBuf}};

use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, AppResult},
    models::book_request::RequestExportRow,
    repository::Repository,
    services::email::{MailAttachment, Mailer, OutgoingMail},
};

pub const EXPORT_FILENAME: &str = "book_requests.csv";

const HEADER: [&str; 9] = [
    "ID",
    "User",
    "Book",
    "Author(s)",
    "Date Requested",
    "Date Issued",
    "Due Date",
    "Return Date",
    "Content",
];

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(|v| v.to_rfc3339()).unwrap_or_default()
}

/// Write the header and one record per row
pub fn write_csv<W: Write>(out: W, rows: &[RequestExportRow]) -> AppResult<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER).map_err(csv_error)?;

    for row in rows {
        writer
            .write_record([
                row.id.to_string(),
                row.username.clone(),
                row.title.clone(),
                row.authors.clone(),
                row.date_requested.to_rfc3339(),
                timestamp(row.date_granted),
                timestamp(row.date_due),
                timestamp(row.date_returned),
                row.content.clone(),
            ])
            .map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::Export(format!("Failed to write CSV: {}", e))
}

/// Write `book_requests.csv` in `dir`, replacing any previous export
pub async fn write_export_file(dir: &Path, rows: &[RequestExportRow]) -> AppResult<PathBuf> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, rows)?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(EXPORT_FILENAME);
    tokio::fs::write(&path, &buffer).await?;
    Ok(path)
}

/// Export every request and mail the file to `recipient`.
///
/// Any failure is returned; nothing is swallowed.
pub async fn run(
    repository: &Repository,
    mailer: &dyn Mailer,
    export_dir: &Path,
    recipient: &str,
) -> AppResult<PathBuf> {
    let rows = repository.requests.export_rows().await?;
    let path = write_export_file(export_dir, &rows).await?;
    tracing::info!("Exported {} requests to {}", rows.len(), path.display());

    let bytes = tokio::fs::read(&path).await?;
    let mail = OutgoingMail {
        attachment: Some(MailAttachment {
            filename: EXPORT_FILENAME.to_string(),
            content_type: "text/csv".to_string(),
            bytes,
        }),
        ..OutgoingMail::text(
            recipient,
            "CSV Export Complete",
            "The CSV export of book requests has been completed.".to_string(),
        )
    };
    mailer.send(mail).await?;

    Ok(path)
}
