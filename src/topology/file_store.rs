//! Local file sink for superpod snapshots
//!
//! Layout: `<root>/super-pod-<id>/super-pod-<id>.json`. Writes go through
//! [`write_guarded`], which refuses anything outside the root or behind a
//! symbolic link and sets explicit permissions.

use crate::error::StoreError;
use crate::topology::model::is_super_pod_id;
use crate::topology::sink::{ReloadHook, TopologySink};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

/// Mode for snapshot files
pub const FILE_MODE: u32 = 0o640;

/// Mode for per-superpod directories
pub const DIR_MODE: u32 = 0o750;

const FILE_PREFIX: &str = "super-pod-";

/// Fail if `path` exists and is a symbolic link
async fn reject_symlink(path: &Path) -> Result<(), StoreError> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_symlink() => Err(StoreError::Symlink(path.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Check that `path` lies lexically under `root`
fn ensure_within(root: &Path, path: &Path) -> Result<(), StoreError> {
    let relative = path.strip_prefix(root).map_err(|_| StoreError::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("outside of {}", root.display()),
    })?;

    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes || relative.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath {
            path: path.to_path_buf(),
            reason: "path must name a file below the root".to_string(),
        });
    }
    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| StoreError::io(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

/// Write `contents` to `path` below `root`.
///
/// Creates the parent directory when absent and replaces the file through a
/// temporary sibling and a rename.
pub async fn write_guarded(root: &Path, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    ensure_within(root, path)?;

    let parent = path.parent().ok_or_else(|| StoreError::InvalidPath {
        path: path.to_path_buf(),
        reason: "no parent directory".to_string(),
    })?;

    reject_symlink(root).await?;
    let mut current = root.to_path_buf();
    if let Ok(relative) = parent.strip_prefix(root) {
        for component in relative.components() {
            current.push(component);
            reject_symlink(&current).await?;
        }
    }
    reject_symlink(path).await?;

    if fs::symlink_metadata(parent).await.is_err() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
        if parent != root {
            set_mode(parent, DIR_MODE).await?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.tmp", file_name));
    reject_symlink(&tmp).await?;

    fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    set_mode(&tmp, FILE_MODE).await?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Topology sink writing one JSON file per superpod
pub struct FileSink {
    root: PathBuf,
    reload: Option<Arc<dyn ReloadHook>>,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reload: None,
        }
    }

    /// Notify `hook` after every successful write
    pub fn with_reload_hook(mut self, hook: Arc<dyn ReloadHook>) -> Self {
        self.reload = Some(hook);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot path for a superpod id
    pub fn path_for(&self, super_pod_id: &str) -> Result<PathBuf, StoreError> {
        let name = format!("{}{}", FILE_PREFIX, super_pod_id);
        if !is_super_pod_id(super_pod_id) {
            return Err(StoreError::InvalidPath {
                path: self.root.join(&name),
                reason: format!("invalid superpod id {:?}", super_pod_id),
            });
        }

        let path = self.root.join(&name).join(format!("{}.json", name));
        ensure_within(&self.root, &path)?;
        Ok(path)
    }
}

#[async_trait]
impl TopologySink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&self, super_pod_id: &str, payload: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(super_pod_id)?;
        write_guarded(&self.root, &path, payload).await?;
        debug!(path = %path.display(), "superpod file written");

        if let Some(hook) = &self.reload {
            hook.on_topology_changed().await;
        }
        Ok(())
    }

    async fn remove(&self, super_pod_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(super_pod_id)?;
        reject_symlink(&path).await?;

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&path, e)),
        }

        if let Some(dir) = path.parent() {
            match fs::remove_dir(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "superpod directory left behind"),
            }
        }
        Ok(())
    }
}
