//! A single file on disk
//!
//! [`File`] is a thin handle: it remembers a path and nothing else, so
//! every call observes the filesystem as it is now. Files deleted behind
//! the SDK's back simply report `None` or an error.

use std::fs::{self, OpenOptions};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::StorageError;

/// Handle to one data file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File {
    path: PathBuf,
    name: String,
}

impl File {
    /// Wrap an existing path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    /// File name without directory
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is still on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Last modification date, `None` if the file is gone
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    /// Append `data` at the end of the file with a single write.
    ///
    /// The file must already exist. Data is synced to disk before
    /// returning.
    pub fn append(&self, data: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    /// Current size in bytes
    pub fn size(&self) -> Result<u64, StorageError> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Open the file for sequential reading
    pub fn stream(&self) -> Result<BufReader<fs::File>, StorageError> {
        fs::File::open(&self.path)
            .map(BufReader::new)
            .map_err(|e| StorageError::UnableToCreateInputStream(format!("{}: {e}", self.path.display())))
    }

    /// Remove the file. Returns `false` when it was already gone.
    pub fn delete(&self) -> Result<bool, StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Toggle the read-only permission bit
    pub fn set_readonly(&self, readonly: bool) -> Result<(), StorageError> {
        let mut permissions = fs::metadata(&self.path)?.permissions();
        permissions.set_readonly(readonly);
        fs::set_permissions(&self.path, permissions)?;
        Ok(())
    }
}
