//! [`Remote`] backed by a local directory tree.
//!
//! Collections are plain directories. A package is a directory holding a
//! `package.json` with its display name and the uploaded files under
//! `files/`, so no uploaded name can clash with the metadata. Node ids are
//! `/`-joined paths relative to the mirror root; the first component is the
//! dataset, which must already exist.

use crate::error::RemoteError;
use crate::path_safety::{validate_path, validate_segment};
use crate::remote::{file_name, Channel, Node, NodeId, NodeKind, NodeState, Remote, UploadReceipt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const PACKAGE_META: &str = "package.json";
pub const PACKAGE_FILES: &str = "files";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PackageMeta {
    pub name: String,
    pub state: NodeState,
    pub sources: Vec<String>,
    pub created_utc: String,
    pub channel: Channel,
}

pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    pub fn open(root: &Path) -> Result<Self, RemoteError> {
        if !root.is_dir() {
            return Err(RemoteError::NotFound { id: root.display().to_string() });
        }
        Ok(Self { root: root.to_path_buf() })
    }

    fn path_of(&self, id: &str) -> Result<PathBuf, RemoteError> {
        validate_path(&self.root, Path::new(id)).map_err(|e| RemoteError::rejected(format!("{e:#}")))
    }

    fn read_node(&self, id: &str) -> Result<Node, RemoteError> {
        let dir = self.path_of(id)?;
        if !dir.is_dir() {
            return Err(RemoteError::NotFound { id: id.to_string() });
        }
        let meta_path = dir.join(PACKAGE_META);
        if meta_path.is_file() {
            let meta = read_meta(&meta_path)?;
            return Ok(Node {
                id: id.to_string(),
                kind: NodeKind::Package,
                name: meta.name,
                state: meta.state,
                sources: meta.sources,
            });
        }
        Ok(Node {
            id: id.to_string(),
            kind: NodeKind::Collection,
            name: file_name(&dir),
            state: NodeState::Ready,
            sources: Vec::new(),
        })
    }

    fn collection_dir(&self, id: &str) -> Result<PathBuf, RemoteError> {
        let node = self.read_node(id)?;
        if !node.is_collection() {
            return Err(RemoteError::rejected(format!("{id} is a package, not a collection")));
        }
        self.path_of(id)
    }

    fn new_package_dir(&self, collection: &str) -> Result<(NodeId, PathBuf), RemoteError> {
        let base = self.collection_dir(collection)?;
        let mut n = 1u32;
        loop {
            let dir_name = format!("pkg-{n:05}");
            let dir = base.join(&dir_name);
            if !dir.exists() {
                fs::create_dir(&dir).map_err(|source| RemoteError::Io { path: dir.clone(), source })?;
                return Ok((format!("{collection}/{dir_name}"), dir));
            }
            n += 1;
        }
    }
}

impl Remote for DirRemote {
    fn dataset(&mut self, name: &str) -> Result<Node, RemoteError> {
        validate_segment(name).map_err(|e| RemoteError::rejected(format!("{e:#}")))?;
        let node = self.read_node(name)?;
        if !node.is_collection() {
            return Err(RemoteError::NotFound { id: name.to_string() });
        }
        Ok(node)
    }

    fn create_collection(&mut self, parent: &NodeId, name: &str) -> Result<Node, RemoteError> {
        validate_segment(name).map_err(|e| RemoteError::rejected(format!("{e:#}")))?;
        let dir = self.collection_dir(parent)?.join(name);
        if dir.exists() {
            return Err(RemoteError::rejected(format!("{parent}/{name} already exists")));
        }
        fs::create_dir(&dir).map_err(|source| RemoteError::Io { path: dir.clone(), source })?;
        self.read_node(&format!("{parent}/{name}"))
    }

    fn list_children(&mut self, collection: &NodeId) -> Result<Vec<Node>, RemoteError> {
        let dir = self.collection_dir(collection)?;
        let mut out = Vec::new();
        for ent in walkdir::WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let ent = ent.map_err(|e| RemoteError::Io { path: dir.clone(), source: e.into() })?;
            if !ent.file_type().is_dir() {
                continue;
            }
            let name = ent.file_name().to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            out.push(self.read_node(&format!("{collection}/{name}"))?);
        }
        Ok(out)
    }

    fn get(&mut self, id: &NodeId) -> Result<Node, RemoteError> {
        self.read_node(id)
    }

    fn upload_group(
        &mut self,
        collection: &NodeId,
        paths: &[PathBuf],
        channel: Channel,
    ) -> Result<UploadReceipt, RemoteError> {
        let mut names = HashSet::new();
        for p in paths {
            if !p.is_file() {
                return Err(RemoteError::NotFound { id: p.display().to_string() });
            }
            if !names.insert(file_name(p)) {
                return Err(RemoteError::rejected(format!(
                    "two files named {} in one package",
                    file_name(p)
                )));
            }
        }
        let (id, dir) = self.new_package_dir(collection)?;
        let sources = match copy_sources(&id, &dir.join(PACKAGE_FILES), paths) {
            Ok(sources) => sources,
            Err(e) => {
                // Leave nothing half-uploaded behind.
                let _ = fs::remove_dir_all(&dir);
                return Err(e);
            }
        };
        let meta = PackageMeta {
            name: paths.first().map(|p| file_name(p)).unwrap_or_default(),
            state: NodeState::Ready,
            sources,
            created_utc: chrono::Utc::now().to_rfc3339(),
            channel,
        };
        if let Err(e) = write_meta(&dir.join(PACKAGE_META), &meta) {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }
        tracing::debug!(package = %id, files = paths.len(), "stored package");
        Ok(match channel {
            Channel::Api => UploadReceipt::Packages(vec![id]),
            Channel::Agent => UploadReceipt::Detached,
        })
    }

    fn rename(&mut self, id: &NodeId, new_name: &str) -> Result<(), RemoteError> {
        let meta_path = self.path_of(id)?.join(PACKAGE_META);
        if !meta_path.is_file() {
            return Err(RemoteError::rejected(format!("{id} is not a package")));
        }
        let parent = id.rsplit_once('/').map_or("", |(p, _)| p).to_string();
        let taken = self
            .list_children(&parent)?
            .into_iter()
            .any(|n| n.id != *id && !n.is_collection() && n.name == new_name);
        if taken {
            return Err(RemoteError::rejected(format!("a package named {new_name} already exists in {parent}")));
        }
        let mut meta = read_meta(&meta_path)?;
        meta.name = new_name.to_string();
        write_meta(&meta_path, &meta)
    }
}

fn copy_sources(id: &str, files_dir: &Path, paths: &[PathBuf]) -> Result<Vec<String>, RemoteError> {
    fs::create_dir(files_dir).map_err(|source| RemoteError::Io { path: files_dir.to_path_buf(), source })?;
    let mut sources = Vec::with_capacity(paths.len());
    for p in paths {
        let name = file_name(p);
        fs::copy(p, files_dir.join(&name)).map_err(|source| RemoteError::Io { path: p.clone(), source })?;
        sources.push(format!("{id}/{PACKAGE_FILES}/{name}"));
    }
    Ok(sources)
}

fn read_meta(path: &Path) -> Result<PackageMeta, RemoteError> {
    let f = fs::File::open(path).map_err(|source| RemoteError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_reader(f).map_err(|e| RemoteError::Io { path: path.to_path_buf(), source: e.into() })
}

fn write_meta(path: &Path, meta: &PackageMeta) -> Result<(), RemoteError> {
    let body = serde_json::to_string_pretty(meta)
        .map_err(|e| RemoteError::Io { path: path.to_path_buf(), source: e.into() })?;
    fs::write(path, body).map_err(|source| RemoteError::Io { path: path.to_path_buf(), source })
}
