//! Local storage of uploaded e-book files

use std::{io::ErrorKind, path::PathBuf};

use crate::{
    error::{AppError, AppResult},
    models::ebook::sanitize_filename,
};

#[derive(Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
}

impl FileStore {
    pub fn new(upload_dir: PathBuf) -> Self {
        Self { upload_dir }
    }

    /// Resolve a stored file name, refusing anything that is not a plain basename
    fn path_for(&self, filename: &str) -> AppResult<PathBuf> {
        match sanitize_filename(filename) {
            Some(clean) if clean == filename => Ok(self.upload_dir.join(clean)),
            _ => Err(AppError::NotFound(format!("File {} not found", filename))),
        }
    }

    /// Write a file, replacing any previous content under the same name
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> AppResult<()> {
        let path = self.path_for(filename)?;
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub async fn read(&self, filename: &str) -> AppResult<Vec<u8>> {
        let path = self.path_for(filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("File {} not found", filename)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a file; a missing file is not an error
    pub async fn remove(&self, filename: &str) -> AppResult<()> {
        let path = self.path_for(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
