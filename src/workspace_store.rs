//! Workspace Store: safe file-tree operations rooted at a per-user,
//! per-workspace directory.
//!
//! Every operation resolves its path against the workspace root, normalizes
//! it, and rejects any resolution that would escape that root — no string
//! prefix checks, a real canonicalization-based descendant test (§4.1, §9).

use crate::error::{AppError, AppResult};
use std::path::{Component, Path, PathBuf};

/// Directory names pruned from `list_recursive` regardless of depth.
const PRUNED_DIRS: &[&str] = &["node_modules", ".git", "dist", ".next"];

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_directory: bool,
}

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Stat {
    pub is_directory: bool,
    pub size: u64,
}

#[derive(Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    /// `root` must already exist or be creatable; it is the directory every
    /// relative path is resolved against.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path, rejecting anything that would
    /// escape the workspace root. Does no I/O beyond canonicalizing existing
    /// ancestors, so it is safe to call before deciding whether an operation
    /// should happen at all.
    fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let relative_path = Path::new(relative);

        // Absolute input paths are never workspace-relative.
        if relative_path.is_absolute() {
            return Err(AppError::Validation("forbidden path".to_string()));
        }

        // Lexically reject `..` components before touching the filesystem —
        // this also catches inputs for files that don't exist yet.
        for component in relative_path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(AppError::Validation("forbidden path".to_string())),
            }
        }

        let joined = self.root.join(relative_path);

        // Canonicalize the nearest existing ancestor so a symlink that
        // escapes the root is caught even when the final component doesn't
        // exist yet (e.g. a `write` creating a new file).
        let mut existing = joined.as_path();
        let mut trailing = Vec::new();
        loop {
            match existing.canonicalize() {
                Ok(canonical) => {
                    let mut resolved = canonical;
                    for component in trailing.iter().rev() {
                        resolved.push(component);
                    }
                    let root_canonical = self
                        .root
                        .canonicalize()
                        .map_err(|_| AppError::Internal(anyhow::anyhow!("workspace root missing")))?;
                    if !resolved.starts_with(&root_canonical) && resolved != root_canonical {
                        return Err(AppError::Validation("forbidden path".to_string()));
                    }
                    return Ok(resolved);
                }
                Err(_) => {
                    let Some(parent) = existing.parent() else {
                        return Err(AppError::Validation("forbidden path".to_string()));
                    };
                    let Some(name) = existing.file_name() else {
                        return Err(AppError::Validation("forbidden path".to_string()));
                    };
                    trailing.push(name.to_owned());
                    existing = parent;
                }
            }
        }
    }

    pub async fn exists(&self, relative: &str) -> AppResult<bool> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    pub async fn stat(&self, relative: &str) -> AppResult<Stat> {
        let path = self.resolve(relative)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(map_io_err)?;
        Ok(Stat {
            is_directory: meta.is_dir(),
            size: meta.len(),
        })
    }

    pub async fn read(&self, relative: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(relative)?;
        tokio::fs::read(&path).await.map_err(map_io_err)
    }

    pub async fn write(&self, relative: &str, bytes: &[u8]) -> AppResult<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(map_io_err)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(map_io_err)
    }

    pub async fn delete(&self, relative: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        let meta = tokio::fs::metadata(&path).await.map_err(map_io_err)?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await.map_err(map_io_err)
        } else {
            tokio::fs::remove_file(&path).await.map_err(map_io_err)
        }
    }

    pub async fn ensure_dir(&self, relative: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        tokio::fs::create_dir_all(&path).await.map_err(map_io_err)
    }

    pub async fn list(&self, relative: &str) -> AppResult<Vec<FileEntry>> {
        let path = self.resolve(relative)?;
        let mut entries = tokio::fs::read_dir(&path).await.map_err(map_io_err)?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(map_io_err)? {
            let file_type = entry.file_type().await.map_err(map_io_err)?;
            out.push(FileEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_directory: file_type.is_dir(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub async fn list_recursive(&self, relative: &str, max_depth: u32) -> AppResult<Vec<String>> {
        let root = self.resolve(relative)?;
        let mut out = Vec::new();
        let mut stack = vec![(root.clone(), 0u32)];
        while let Some((dir, depth)) = stack.pop() {
            if depth > max_depth {
                continue;
            }
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(map_io_err)?;
            while let Some(entry) = entries.next_entry().await.map_err(map_io_err)? {
                let name = entry.file_name().to_string_lossy().to_string();
                if PRUNED_DIRS.contains(&name.as_str()) {
                    continue;
                }
                let file_type = entry.file_type().await.map_err(map_io_err)?;
                let path = entry.path();
                let rel = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string();
                if file_type.is_dir() {
                    if depth < max_depth {
                        stack.push((path, depth + 1));
                    }
                    out.push(rel);
                } else {
                    out.push(rel);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    pub async fn copy(&self, from: &str, to: &str) -> AppResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if let Some(parent) = to_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(map_io_err)?;
        }
        tokio::fs::copy(&from_path, &to_path)
            .await
            .map_err(map_io_err)?;
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> AppResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if let Some(parent) = to_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(map_io_err)?;
        }
        tokio::fs::rename(&from_path, &to_path)
            .await
            .map_err(map_io_err)
    }
}

fn map_io_err(err: std::io::Error) -> AppError {
    match err.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound("file not found".to_string()),
        std::io::ErrorKind::PermissionDenied => {
            AppError::Authorization("access denied".to_string())
        }
        _ => AppError::Internal(anyhow::anyhow!(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());
        store.write("src/main.rs", b"fn main() {}").await.unwrap();
        let content = store.read("src/main.rs").await.unwrap();
        assert_eq!(content, b"fn main() {}");
    }

    #[tokio::test]
    async fn dotdot_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());
        let err = store.write("../escape.txt", b"pwned").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn absolute_path_is_rejected() {
        let dir = tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());
        let err = store.write("/etc/passwd", b"pwned").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn symlink_escape_is_rejected() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
            let err = store.write("escape/file.txt", b"pwned").await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            assert!(!outside.path().join("file.txt").exists());
        }
    }

    #[tokio::test]
    async fn list_recursive_prunes_build_dirs() {
        let dir = tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());
        store.write("node_modules/pkg/index.js", b"x").await.unwrap();
        store.write("src/lib.rs", b"x").await.unwrap();
        let entries = store.list_recursive("", 8).await.unwrap();
        assert!(entries.iter().any(|e| e == "src/lib.rs"));
        assert!(!entries.iter().any(|e| e.starts_with("node_modules")));
    }
}
