//! Read-only access to isolated temp workspaces.
//!
//! Admission is structural: the requested path must live under the service
//! temp root inside a directory carrying the isolated-workspace prefix, and
//! must not contain `..`. There are no write endpoints.

use std::path::{Path as FsPath, PathBuf};

use axum::Json;
use axum::extract::{Query, State};
use maestro_core::MaestroError;
use maestro_workspace::is_admissible_workspace_path;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::AppState;

/// Query parameters for workspace browsing.
#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    /// Absolute isolated-workspace path.
    pub workspace_path: String,
    /// Owning workflow (ownership enforcement lives in the auth layer).
    #[allow(dead_code)]
    pub workflow_id: String,
    /// Optional relative subpath.
    #[serde(default)]
    pub path: Option<String>,
}

/// Query parameters for file reads.
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Absolute isolated-workspace path.
    pub workspace_path: String,
    /// Owning workflow.
    #[allow(dead_code)]
    pub workflow_id: String,
    /// File path relative to the workspace.
    pub file_path: String,
}

/// One directory entry.
#[derive(Debug, Serialize)]
pub struct Entry {
    /// File or directory name.
    pub name: String,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Size in bytes (files only).
    pub size: u64,
}

/// File content response.
#[derive(Debug, Serialize)]
pub struct FileContent {
    /// The file path as requested.
    pub file_path: String,
    /// UTF-8 content (lossy).
    pub content: String,
}

fn admit(state: &AppState, workspace_path: &str, relative: Option<&str>) -> Result<PathBuf, ApiError> {
    let workspace = FsPath::new(workspace_path);
    if !is_admissible_workspace_path(&state.config.temp_root, workspace) {
        return Err(MaestroError::Validation(
            "workspace_path is outside the isolated workspace root".into(),
        )
        .into());
    }
    let target = match relative {
        Some(rel) => workspace.join(rel),
        None => workspace.to_path_buf(),
    };
    // The joined path must still be admissible (no `..` escapes).
    if !is_admissible_workspace_path(&state.config.temp_root, &target) {
        return Err(MaestroError::Validation("path escapes the workspace".into()).into());
    }
    Ok(target)
}

/// GET /api/workspaces/browse — list a directory inside an isolated
/// workspace.
pub async fn browse(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<Vec<Entry>>, ApiError> {
    let target = admit(&state, &query.workspace_path, query.path.as_deref())?;

    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(&target)
        .await
        .map_err(MaestroError::Io)?;
    while let Some(entry) = dir.next_entry().await.map_err(MaestroError::Io)? {
        let metadata = entry.metadata().await.map_err(MaestroError::Io)?;
        entries.push(Entry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(entries))
}

/// GET /api/workspaces/file — read a file inside an isolated workspace.
pub async fn file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Json<FileContent>, ApiError> {
    let target = admit(&state, &query.workspace_path, Some(&query.file_path))?;
    let bytes = tokio::fs::read(&target).await.map_err(MaestroError::Io)?;
    Ok(Json(FileContent {
        file_path: query.file_path,
        content: String::from_utf8_lossy(&bytes).into_owned(),
    }))
}
