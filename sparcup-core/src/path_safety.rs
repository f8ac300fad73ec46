use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};

/// A single collection or dataset name must stay one directory level: no
/// separators, no `.`/`..`, nothing empty.
pub fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        bail!("invalid name: {:?}", name);
    }
    if name.contains(['/', '\\', '\0']) {
        bail!("name must not contain separators: {:?}", name);
    }
    Ok(())
}

/// Ensure `rel` is safe relative to `root`: no absolute, no `..`, and no
/// symlinks anywhere along the way.
pub fn validate_path(root: &Path, rel: &Path) -> Result<PathBuf> {
    if rel.is_absolute() {
        bail!("absolute paths are not allowed: {:?}", rel);
    }
    for comp in rel.components() {
        if !matches!(comp, Component::Normal(_)) {
            bail!("only plain components allowed: {:?}", rel);
        }
    }
    let mut cur = root.to_path_buf();
    for comp in rel.components() {
        cur = cur.join(comp);
        if let Ok(m) = std::fs::symlink_metadata(&cur) {
            if m.file_type().is_symlink() {
                bail!("symlink in path (not following): {:?}", cur);
            }
        }
    }
    Ok(cur)
}
