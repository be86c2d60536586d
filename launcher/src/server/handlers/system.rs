//! System utility operations: working directory and folder browsing.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::LauncherError;
use crate::events::EventSink;
use crate::filesys::dir::Dir;

/// One folder entry in a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
}

pub async fn get_system_info(sink: &EventSink) {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    sink.emit("system-info", serde_json::json!({ "cwd": cwd }));
}

/// List the subfolders of a path for the source picker. The payload is the
/// requested path as a bare string; empty means the working directory.
pub async fn list_directory(sink: &EventSink, payload: serde_json::Value) {
    let requested = payload.as_str().unwrap_or_default();
    let target = if requested.is_empty() {
        match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => {
                sink.emit(
                    "directory-error",
                    serde_json::json!({ "message": e.to_string() }),
                );
                return;
            }
        }
    } else {
        PathBuf::from(requested)
    };

    match folder_listing(&target).await {
        Ok(folders) => sink.emit(
            "directory-listing",
            serde_json::json!({
                "path": target.display().to_string(),
                "folders": folders,
            }),
        ),
        Err(e) => sink.emit(
            "directory-error",
            serde_json::json!({ "message": e.to_string() }),
        ),
    }
}

/// Visible subfolders of `target`, with a `..` entry first unless `target`
/// is a filesystem root.
async fn folder_listing(target: &Path) -> Result<Vec<FolderEntry>, LauncherError> {
    let names = Dir::new(target).list_dir_names().await?;

    let mut folders: Vec<FolderEntry> = names
        .into_iter()
        .map(|name| FolderEntry {
            path: target.join(&name).display().to_string(),
            name,
        })
        .collect();

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && parent != target {
            folders.insert(
                0,
                FolderEntry {
                    name: "..".to_string(),
                    path: parent.display().to_string(),
                },
            );
        }
    }

    Ok(folders)
}
