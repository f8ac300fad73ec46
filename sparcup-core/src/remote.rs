//! Interface to the remote hierarchical-storage service.

use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type NodeId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Collection,
    Package,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Creating,
    Ready,
    Unavailable,
    Other(String),
}

/// Snapshot of a remote collection or package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub state: NodeState,
    /// Source-file references (keys or paths) of a package. Only meaningful
    /// once the package is settled.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Node {
    pub fn is_collection(&self) -> bool {
        self.kind == NodeKind::Collection
    }

    /// Collections are usable only when `Ready`; packages once they have left
    /// `Unavailable`.
    pub fn is_settled(&self) -> bool {
        match self.kind {
            NodeKind::Collection => self.state == NodeState::Ready,
            NodeKind::Package => self.state != NodeState::Unavailable,
        }
    }

    /// Base names of the package's sources, in order.
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| base_name(s))
    }
}

/// Upload transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Synchronous API call; reports the packages it created.
    #[default]
    Api,
    /// Out-of-band agent; reports nothing back.
    Agent,
}

/// What an upload call told us about its result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadReceipt {
    Packages(Vec<NodeId>),
    Detached,
}

pub trait Remote {
    /// Root collection of an existing dataset.
    fn dataset(&mut self, name: &str) -> Result<Node, RemoteError>;

    fn create_collection(&mut self, parent: &NodeId, name: &str) -> Result<Node, RemoteError>;

    /// Direct children only.
    fn list_children(&mut self, collection: &NodeId) -> Result<Vec<Node>, RemoteError>;

    /// Current state of a node.
    fn get(&mut self, id: &NodeId) -> Result<Node, RemoteError>;

    fn upload_single(
        &mut self,
        collection: &NodeId,
        path: &Path,
        channel: Channel,
    ) -> Result<UploadReceipt, RemoteError> {
        self.upload_group(collection, &[path.to_path_buf()], channel)
    }

    /// Upload all `paths` in one call; they succeed or fail together.
    fn upload_group(
        &mut self,
        collection: &NodeId,
        paths: &[PathBuf],
        channel: Channel,
    ) -> Result<UploadReceipt, RemoteError>;

    fn rename(&mut self, id: &NodeId, new_name: &str) -> Result<(), RemoteError>;
}

/// Last component of a `/` or `\` separated path or key.
pub fn base_name(s: &str) -> &str {
    s.rsplit(['/', '\\']).next().unwrap_or(s)
}

/// File name of a local path as a string.
pub fn file_name(p: &Path) -> String {
    p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
