//! Directory abstraction
//!
//! A [`Directory`] is exclusive to one storage stream. Listing always goes
//! back to the filesystem; nothing about its content is cached.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::file::File;

/// Attempts made for directory-level operations
const DIRECTORY_RETRIES: u32 = 3;
/// Pause between directory-level attempts
const DIRECTORY_RETRY_DELAY: Duration = Duration::from_millis(1);
/// Pause between attempts to move a single file
const FILE_RETRY_DELAY: Duration = Duration::from_micros(100);

/// Distinguishes swap directories created by this process
static SWAP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Run `operation` up to `times` times, sleeping `delay` between attempts
pub fn retry<T>(
    times: u32,
    delay: Duration,
    mut operation: impl FnMut() -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= times => return Err(e),
            Err(e) => {
                debug!(attempt, error = %e, "Retrying storage operation");
                attempt += 1;
                thread::sleep(delay);
            }
        }
    }
}

/// Handle to one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Open an existing directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(StorageError::directory_not_found(path.display().to_string()));
        }
        Ok(Self { path })
    }

    /// Open a directory, creating it and its parents when missing
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create `relative` below this directory. Succeeds if it already exists.
    pub fn create_subdirectory(&self, relative: impl AsRef<Path>) -> Result<Directory, StorageError> {
        Self::create(self.path.join(relative))
    }

    /// Open `relative` below this directory, which must exist
    pub fn subdirectory(&self, relative: impl AsRef<Path>) -> Result<Directory, StorageError> {
        Self::open(self.path.join(relative))
    }

    /// Regular files in this directory, sorted by name
    pub fn files(&self) -> Result<Vec<File>, StorageError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(File::new(entry.path()));
            }
        }
        files.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(files)
    }

    /// Direct subdirectories, sorted by path
    pub fn subdirectories(&self) -> Result<Vec<Directory>, StorageError> {
        let mut directories = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                directories.push(Directory { path: entry.path() });
            }
        }
        directories.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(directories)
    }

    /// Number of regular files
    pub fn files_count(&self) -> Result<usize, StorageError> {
        Ok(self.files()?.len())
    }

    /// Create a new empty file. Fails if the name is taken.
    pub fn create_file(&self, name: &str) -> Result<File, StorageError> {
        let path = self.path.join(name);
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(File::new(path))
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.path.join(name).is_file()
    }

    /// Existing file by name
    pub fn file(&self, name: &str) -> Result<File, StorageError> {
        let file = File::new(self.path.join(name));
        if !file.exists() {
            return Err(StorageError::io(format!("file not found: {}", file.path().display())));
        }
        Ok(file)
    }

    /// File with the oldest modification date
    pub fn oldest_file(&self) -> Result<Option<File>, StorageError> {
        Ok(self
            .files()?
            .into_iter()
            .filter_map(|file| file.modified_at().map(|date| (date, file)))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, file)| file))
    }

    /// Most recently modified file in this directory tree, optionally only
    /// among files modified strictly before `before`
    pub fn most_recent_modified_file(&self, before: Option<DateTime<Utc>>) -> Result<Option<File>, StorageError> {
        let mut candidates: Vec<(DateTime<Utc>, File)> = self
            .files()?
            .into_iter()
            .filter_map(|file| file.modified_at().map(|date| (date, file)))
            .collect();
        for subdirectory in self.subdirectories()? {
            if let Some(file) = subdirectory.most_recent_modified_file(before)? {
                if let Some(date) = file.modified_at() {
                    candidates.push((date, file));
                }
            }
        }

        Ok(candidates
            .into_iter()
            .filter(|(date, _)| before.is_none_or(|limit| *date < limit))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, file)| file))
    }

    /// Remove everything in this directory.
    ///
    /// The directory is swapped with a fresh empty one before the old
    /// content is removed, so readers see either the old content or an
    /// empty directory.
    pub fn delete_all_files(&self) -> Result<(), StorageError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| StorageError::io(format!("{} has no parent", self.path.display())))?;
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = format!(
            "{}-{}",
            std::process::id(),
            SWAP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let fresh = parent.join(format!(".{name}.{suffix}.fresh"));
        let trash = parent.join(format!(".{name}.{suffix}.trash"));

        fs::create_dir_all(&fresh)?;
        if let Err(e) = retry(DIRECTORY_RETRIES, DIRECTORY_RETRY_DELAY, || {
            fs::rename(&self.path, &trash).map_err(StorageError::from)
        }) {
            let _ = fs::remove_dir(&fresh);
            return Err(e);
        }
        if let Err(e) = retry(DIRECTORY_RETRIES, DIRECTORY_RETRY_DELAY, || {
            fs::rename(&fresh, &self.path).map_err(StorageError::from)
        }) {
            // Put the old content back rather than leave no directory at all
            let _ = fs::rename(&trash, &self.path);
            let _ = fs::remove_dir(&fresh);
            return Err(e);
        }

        if let Err(e) = fs::remove_dir_all(&trash) {
            warn!(path = %trash.display(), error = %e, "Failed to remove swapped-out directory");
        }
        Ok(())
    }

    /// Move every file of this directory into `destination`.
    ///
    /// A file that cannot be moved after a few attempts is left in place.
    pub fn move_all_files(&self, destination: &Directory) -> Result<(), StorageError> {
        retry(DIRECTORY_RETRIES, DIRECTORY_RETRY_DELAY, || {
            for file in self.files()? {
                let Some(target) = destination.free_path_for(file.name()) else {
                    warn!(file = file.name(), "No free name in destination, file left in place");
                    continue;
                };
                let moved = retry(DIRECTORY_RETRIES, FILE_RETRY_DELAY, || {
                    match fs::rename(file.path(), &target) {
                        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                        _ => Ok(()),
                    }
                });
                if let Err(e) = moved {
                    warn!(file = file.name(), error = %e, "Failed to move file");
                }
            }
            Ok(())
        })
    }

    /// A path in this directory for `name` that does not clobber an
    /// existing file. Numeric names are bumped until free.
    fn free_path_for(&self, name: &str) -> Option<PathBuf> {
        let candidate = self.path.join(name);
        if !candidate.exists() {
            return Some(candidate);
        }
        let mut number: u64 = name.parse().ok()?;
        let width = name.len();
        loop {
            number = number.checked_add(1)?;
            let candidate = self.path.join(format!("{number:0width$}"));
            if !candidate.exists() {
                return Some(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_create_subdirectory_is_idempotent() {
        let root = TempDir::new().unwrap();
        let directory = Directory::open(root.path()).unwrap();

        let first = directory.create_subdirectory("feature/v2").unwrap();
        first.create_file("1").unwrap();
        let second = directory.create_subdirectory("feature/v2").unwrap();

        assert_eq!(first, second);
        assert!(second.has_file("1"));
        assert!(directory.subdirectory("feature/missing").is_err());
    }

    #[test]
    fn test_files_lists_regular_files_only() {
        let root = TempDir::new().unwrap();
        let directory = Directory::open(root.path()).unwrap();
        directory.create_file("b").unwrap();
        directory.create_file("a").unwrap();
        directory.create_subdirectory("nested").unwrap();

        let names: Vec<_> = directory.files().unwrap().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(directory.subdirectories().unwrap().len(), 1);
        assert!(directory.create_file("a").is_err());
    }

    #[test]
    fn test_delete_all_files_leaves_empty_directory() {
        let root = TempDir::new().unwrap();
        let directory = Directory::create(root.path().join("data")).unwrap();
        directory.create_file("1").unwrap();
        directory.create_file("2").unwrap();
        directory.create_subdirectory("nested").unwrap();

        directory.delete_all_files().unwrap();

        assert!(directory.path().is_dir());
        assert_eq!(directory.files_count().unwrap(), 0);
        assert!(directory.subdirectories().unwrap().is_empty());
        // No swap leftovers next to the directory
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_back_to_back_clears_use_distinct_swap_directories() {
        let root = TempDir::new().unwrap();
        let directory = Directory::create(root.path().join("data")).unwrap();

        for i in 0..50 {
            directory.create_file(&i.to_string()).unwrap();
            directory.delete_all_files().unwrap();
        }

        assert_eq!(directory.files_count().unwrap(), 0);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_move_all_files() {
        let root = TempDir::new().unwrap();
        let source = Directory::create(root.path().join("source")).unwrap();
        let destination = Directory::create(root.path().join("destination")).unwrap();
        source.create_file("00000000000000000001").unwrap().append(b"one").unwrap();
        source.create_file("00000000000000000002").unwrap().append(b"two").unwrap();
        destination.create_file("00000000000000000002").unwrap().append(b"existing").unwrap();

        source.move_all_files(&destination).unwrap();

        assert_eq!(source.files_count().unwrap(), 0);
        let names: Vec<_> = destination.files().unwrap().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(
            names,
            vec!["00000000000000000001", "00000000000000000002", "00000000000000000003"]
        );
        assert_eq!(fs::read(destination.path().join("00000000000000000002")).unwrap(), b"existing");
        assert_eq!(fs::read(destination.path().join("00000000000000000003")).unwrap(), b"two");
    }

    #[test]
    fn test_most_recent_modified_file() {
        let root = TempDir::new().unwrap();
        let directory = Directory::open(root.path()).unwrap();
        let older = directory.create_file("older").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let nested = directory.create_subdirectory("nested").unwrap();
        let newer = nested.create_file("newer").unwrap();

        let found = directory.most_recent_modified_file(None).unwrap().unwrap();
        assert_eq!(found.name(), "newer");

        let before = newer.modified_at().unwrap();
        let found = directory.most_recent_modified_file(Some(before)).unwrap().unwrap();
        assert_eq!(found.name(), older.name());

        assert_eq!(directory.oldest_file().unwrap().unwrap().name(), "older");
    }

    #[test]
    fn test_retry_gives_up_after_attempts() {
        let mut attempts = 0;
        let result: Result<(), StorageError> = retry(3, Duration::from_micros(1), || {
            attempts += 1;
            Err(StorageError::io("still failing"))
        });
        assert!(result.is_err());
        assert_eq!(attempts, 3);

        let mut attempts = 0;
        let value = retry(3, Duration::from_micros(1), || {
            attempts += 1;
            if attempts < 2 { Err(StorageError::io("flaky")) } else { Ok(attempts) }
        })
        .unwrap();
        assert_eq!(value, 2);
    }
}
