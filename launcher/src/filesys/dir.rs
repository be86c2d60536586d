//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::LauncherError;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// List names of files directly inside the directory
    pub async fn list_file_names(&self) -> Result<Vec<String>, LauncherError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(names)
    }

    /// List names of subdirectories, skipping hidden ones
    pub async fn list_dir_names(&self) -> Result<Vec<String>, LauncherError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
        }

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_dir_names_skips_hidden_and_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("visible")).await.unwrap();
        fs::create_dir(dir.path().join(".hidden")).await.unwrap();
        fs::write(dir.path().join("file.txt"), b"x").await.unwrap();

        let names = Dir::new(dir.path()).list_dir_names().await.unwrap();
        assert_eq!(names, vec!["visible".to_string()]);
    }

    #[tokio::test]
    async fn test_exists_is_false_for_files() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("plain.txt");
        fs::write(&file_path, b"x").await.unwrap();

        assert!(Dir::new(dir.path()).exists().await);
        assert!(!Dir::new(&file_path).exists().await);
    }
}
