//! Code location to container mount resolution

use fclocal_core::InvokeError;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Directory the function code is exposed under inside the container
pub const CODE_DIR: &str = "/code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
}

/// Host path bound into the function container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    #[serde(rename = "Type")]
    pub kind: MountKind,
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Resolve a code location into a read-only bind mount under [`CODE_DIR`]
///
/// Directories are mounted at `/code`; single files (jars, scripts) at
/// `/code/<file name>`.
pub async fn resolve_mount(code_uri: &Path) -> Result<Mount, InvokeError> {
    let source = absolute_path(code_uri)?;

    let metadata = tokio::fs::symlink_metadata(&source)
        .await
        .map_err(|e| InvokeError::PathNotFound {
            path: source.clone(),
            source: e,
        })?;

    let target = if metadata.is_dir() {
        CODE_DIR.to_string()
    } else {
        match source.file_name() {
            Some(name) => format!("{CODE_DIR}/{}", name.to_string_lossy()),
            None => CODE_DIR.to_string(),
        }
    };

    debug!(source = %source.display(), target = %target, "Resolved code mount");

    Ok(Mount {
        kind: MountKind::Bind,
        source,
        target,
        read_only: true,
    })
}

/// Make a path absolute against the current directory and drop `.`/`..` segments
fn absolute_path(path: &Path) -> Result<PathBuf, InvokeError> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| unresolvable(path, e))?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

fn unresolvable(path: &Path, source: std::io::Error) -> InvokeError {
    InvokeError::PathNotFound {
        path: path.to_path_buf(),
        source,
    }
}
