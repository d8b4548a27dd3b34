use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use uuid::Uuid;

/// A file written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    /// Path the bytes were written to.
    pub path: String,
    /// Name the client supplied, or "unknown".
    pub original_name: String,
    pub size: usize,
}

/// Writes uploads into a flat directory under random names.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create the store, making sure the upload directory exists.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create upload directory: {}", root.display()))?;
        Ok(FileStore { root })
    }

    /// Persist uploaded bytes under a random name, keeping the original
    /// extension. Files without one are assumed to be PDFs.
    pub fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<SavedFile> {
        let original = original_name.unwrap_or("unknown").to_string();
        let extension = Path::new(&original)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_else(|| ".pdf".to_string());

        let path = self.root.join(format!("{}{}", Uuid::new_v4(), extension));
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write upload: {}", path.display()))?;

        Ok(SavedFile {
            path: path.to_string_lossy().into_owned(),
            original_name: original,
            size: bytes.len(),
        })
    }

    /// Best-effort removal of a stored file.
    pub fn delete(&self, path: &str) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to delete {}: {}", path, err);
                false
            }
        }
    }
}

/// Human-readable file size, as recorded with each uploaded document.
pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_keeps_extension_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let saved = store.save(Some("report.PDF"), b"content").unwrap();
        assert!(saved.path.ends_with(".PDF"));
        assert_eq!(saved.original_name, "report.PDF");
        assert_eq!(saved.size, 7);
        assert_eq!(fs::read(&saved.path).unwrap(), b"content");
    }

    #[test]
    fn test_save_defaults_missing_name_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let saved = store.save(None, b"data").unwrap();
        assert_eq!(saved.original_name, "unknown");
        assert!(saved.path.ends_with(".pdf"));

        let saved = store.save(Some("noextension"), b"data").unwrap();
        assert!(saved.path.ends_with(".pdf"));
    }

    #[test]
    fn test_random_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let first = store.save(Some("same.pdf"), b"one").unwrap();
        let second = store.save(Some("same.pdf"), b"two").unwrap();
        assert_ne!(first.path, second.path);
    }

    #[test]
    fn test_delete_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let saved = store.save(Some("gone.pdf"), b"bytes").unwrap();
        assert!(store.delete(&saved.path));
        assert!(!store.delete(&saved.path));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
