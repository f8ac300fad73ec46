//! In-process [`Remote`] that behaves like the real service closely enough
//! for dry runs and tests: new nodes start out unready, package names lose
//! well-known extensions, and failures can be injected.

use crate::error::RemoteError;
use crate::remote::{file_name, Channel, Node, NodeId, NodeKind, NodeState, Remote, UploadReceipt};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

#[derive(Clone, Debug)]
struct Entry {
    node: Node,
    parent: Option<NodeId>,
    /// Sources become visible once the package settles.
    pending_sources: Vec<String>,
    /// `get` calls left before the node becomes ready.
    ticks_left: u32,
}

/// One recorded upload call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadCall {
    pub collection: NodeId,
    pub files: Vec<String>,
    pub channel: Channel,
}

#[derive(Debug)]
pub struct MemoryRemote {
    nodes: BTreeMap<NodeId, Entry>,
    next_id: u64,
    /// `get` calls a new node needs before it is ready.
    pub settle_after: u32,
    /// Extensions removed from package names on upload.
    pub stripped_extensions: HashSet<String>,
    pub fail_create: HashSet<String>,
    /// Uploads containing one of these file names fail.
    pub fail_upload: HashSet<String>,
    /// Uploads containing one of these file names fail on the agent channel.
    pub fail_agent: HashSet<String>,
    pub fail_rename: bool,
    pub uploads: Vec<UploadCall>,
    pub renames: Vec<(NodeId, String)>,
    pub creates: Vec<(NodeId, String)>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 1,
            settle_after: 0,
            stripped_extensions: ["txt", "csv", "json", "pdf", "png", "jpg", "tif", "tiff"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            fail_create: HashSet::new(),
            fail_upload: HashSet::new(),
            fail_agent: HashSet::new(),
            fail_rename: false,
            uploads: Vec::new(),
            renames: Vec::new(),
            creates: Vec::new(),
        }
    }

    /// Add a ready dataset root and return its id.
    pub fn add_dataset(&mut self, name: &str) -> NodeId {
        self.insert(None, NodeKind::Collection, name.to_string(), Vec::new(), NodeState::Ready)
    }

    /// Seed a package as if it had been uploaded earlier.
    pub fn add_package(&mut self, parent: &NodeId, name: &str, sources: &[&str], state: NodeState) -> NodeId {
        let sources = sources.iter().map(|s| s.to_string()).collect();
        self.insert(Some(parent.clone()), NodeKind::Package, name.to_string(), sources, state)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id).map(|e| &e.node)
    }

    /// Children of `parent` as they currently are, without advancing state.
    pub fn children(&self, parent: &NodeId) -> Vec<&Node> {
        self.nodes.values().filter(|e| e.parent.as_ref() == Some(parent)).map(|e| &e.node).collect()
    }

    /// Follow `/`-joined collection names from `root`.
    pub fn lookup(&self, root: &NodeId, path: &str) -> Option<&Node> {
        let mut cur = self.nodes.get(root)?;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            cur = self
                .nodes
                .values()
                .find(|e| e.parent.as_ref() == Some(&cur.node.id) && e.node.name == seg)?;
        }
        Some(&cur.node)
    }

    /// Indented listing of everything under `root`.
    pub fn render_tree(&self, root: &NodeId) -> String {
        let mut out = String::new();
        self.render_into(root, 0, &mut out);
        out
    }

    fn render_into(&self, id: &NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        let marker = if node.is_collection() { "/" } else { "" };
        out.push_str(&format!("{}{}{}\n", "  ".repeat(depth), node.name, marker));
        let mut kids: Vec<_> = self.children(id).into_iter().map(|n| n.id.clone()).collect();
        kids.sort_by(|a, b| self.nodes[a].node.name.cmp(&self.nodes[b].node.name));
        for kid in kids {
            self.render_into(&kid, depth + 1, out);
        }
    }

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        kind: NodeKind,
        name: String,
        sources: Vec<String>,
        state: NodeState,
    ) -> NodeId {
        let id = format!("N:{}:{}", if kind == NodeKind::Collection { "collection" } else { "package" }, self.next_id);
        self.next_id += 1;
        let settled = state == NodeState::Ready;
        let (visible, pending) = if settled { (sources, Vec::new()) } else { (Vec::new(), sources) };
        let node = Node { id: id.clone(), kind, name, state, sources: visible };
        let ticks_left = if settled { 0 } else { self.settle_after };
        self.nodes.insert(id.clone(), Entry { node, parent, pending_sources: pending, ticks_left });
        id
    }

    fn unready_state(kind: NodeKind) -> NodeState {
        match kind {
            NodeKind::Collection => NodeState::Creating,
            NodeKind::Package => NodeState::Unavailable,
        }
    }

    fn tick(&mut self, id: &NodeId) -> Result<Node, RemoteError> {
        let e = self.nodes.get_mut(id).ok_or_else(|| RemoteError::NotFound { id: id.clone() })?;
        if e.node.state != NodeState::Ready {
            e.ticks_left = e.ticks_left.saturating_sub(1);
            if e.ticks_left == 0 {
                e.node.state = NodeState::Ready;
                e.node.sources.append(&mut e.pending_sources);
            }
        }
        Ok(e.node.clone())
    }

    fn package_name(&self, file: &str) -> String {
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && self.stripped_extensions.contains(ext) => stem.to_string(),
            _ => file.to_string(),
        }
    }

    fn ensure_collection(&self, id: &NodeId) -> Result<(), RemoteError> {
        match self.nodes.get(id) {
            Some(e) if e.node.is_collection() => Ok(()),
            Some(_) => Err(RemoteError::rejected(format!("{id} is not a collection"))),
            None => Err(RemoteError::NotFound { id: id.clone() }),
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl Remote for MemoryRemote {
    fn dataset(&mut self, name: &str) -> Result<Node, RemoteError> {
        self.nodes
            .values()
            .find(|e| e.parent.is_none() && e.node.name == name)
            .map(|e| e.node.clone())
            .ok_or_else(|| RemoteError::NotFound { id: name.to_string() })
    }

    fn create_collection(&mut self, parent: &NodeId, name: &str) -> Result<Node, RemoteError> {
        self.ensure_collection(parent)?;
        if self.fail_create.contains(name) {
            return Err(RemoteError::Transport { message: format!("create {name}: 503 Service Unavailable") });
        }
        let state = if self.settle_after == 0 { NodeState::Ready } else { Self::unready_state(NodeKind::Collection) };
        let id = self.insert(Some(parent.clone()), NodeKind::Collection, name.to_string(), Vec::new(), state);
        self.creates.push((parent.clone(), name.to_string()));
        Ok(self.nodes[&id].node.clone())
    }

    fn list_children(&mut self, collection: &NodeId) -> Result<Vec<Node>, RemoteError> {
        self.ensure_collection(collection)?;
        Ok(self.children(collection).into_iter().cloned().collect())
    }

    fn get(&mut self, id: &NodeId) -> Result<Node, RemoteError> {
        self.tick(id)
    }

    fn upload_group(
        &mut self,
        collection: &NodeId,
        paths: &[PathBuf],
        channel: Channel,
    ) -> Result<UploadReceipt, RemoteError> {
        self.ensure_collection(collection)?;
        let files: Vec<String> = paths.iter().map(|p| file_name(p)).collect();
        if let Some(bad) = files.iter().find(|f| self.fail_agent.contains(*f)) {
            if channel == Channel::Agent {
                return Err(RemoteError::Agent { message: format!("agent exited while sending {bad}") });
            }
        }
        if let Some(bad) = files.iter().find(|f| self.fail_upload.contains(*f)) {
            return Err(RemoteError::Transport { message: format!("upload of {bad} interrupted") });
        }
        self.uploads.push(UploadCall { collection: collection.clone(), files: files.clone(), channel });

        let first = files.first().cloned().unwrap_or_default();
        let name = self.package_name(&first);
        let sources = files.iter().map(|f| format!("{collection}/{f}")).collect();
        let state = if self.settle_after == 0 { NodeState::Ready } else { Self::unready_state(NodeKind::Package) };
        let id = self.insert(Some(collection.clone()), NodeKind::Package, name, sources, state);
        Ok(match channel {
            Channel::Api => UploadReceipt::Packages(vec![id]),
            Channel::Agent => UploadReceipt::Detached,
        })
    }

    fn rename(&mut self, id: &NodeId, new_name: &str) -> Result<(), RemoteError> {
        if self.fail_rename {
            return Err(RemoteError::rejected("rename refused"));
        }
        let e = self.nodes.get_mut(id).ok_or_else(|| RemoteError::NotFound { id: id.clone() })?;
        if e.node.state == NodeState::Unavailable {
            return Err(RemoteError::rejected(format!("{} is still processing", e.node.name)));
        }
        e.node.name = new_name.to_string();
        self.renames.push((id.clone(), new_name.to_string()));
        Ok(())
    }
}
