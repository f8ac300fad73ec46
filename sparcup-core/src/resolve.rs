use crate::config::WaitPolicy;
use crate::remote::{Node, NodeId, Remote};
use crate::wait::{poll, Waited};

/// Where a path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: NodeId,
    /// Segments that could not be created. Every segment after the first of
    /// these sits under the wrong parent.
    pub skipped: Vec<String>,
}

/// Find or create every segment of the `/`-joined `path` under `parent` and
/// return the deepest collection. A segment that cannot be created is
/// logged and the walk carries on from the last good collection.
pub fn resolve<R: Remote + ?Sized>(
    remote: &mut R,
    parent: &NodeId,
    path: &str,
    policy: &WaitPolicy,
) -> Resolved {
    let mut current = parent.clone();
    let mut skipped = Vec::new();
    let mut intended = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !intended.is_empty() {
            intended.push('/');
        }
        intended.push_str(segment);
        if !skipped.is_empty() {
            tracing::warn!(collection = %segment, intended = %intended, placed_under = %current,
                "collection placed outside its intended parent");
        }
        let node = match find_collection(remote, &current, segment) {
            Some(found) => found,
            None => {
                tracing::info!(collection = %segment, parent = %current, "creating collection");
                match remote.create_collection(&current, segment) {
                    Ok(created) => created,
                    Err(e) => {
                        tracing::error!(collection = %segment, parent = %current, error = %e,
                            "cannot create collection, continuing under parent");
                        skipped.push(segment.to_string());
                        continue;
                    }
                }
            }
        };
        current = wait_collection(remote, node, policy).id;
    }
    Resolved { id: current, skipped }
}

fn find_collection<R: Remote + ?Sized>(remote: &mut R, parent: &NodeId, name: &str) -> Option<Node> {
    match remote.list_children(parent) {
        Ok(children) => children.into_iter().find(|c| c.is_collection() && c.name == name),
        Err(e) => {
            tracing::warn!(parent = %parent, error = %e, "cannot list collection");
            None
        }
    }
}

/// Poll a collection until it is `Ready`; returns the freshest state seen.
pub fn wait_collection<R: Remote + ?Sized>(remote: &mut R, node: Node, policy: &WaitPolicy) -> Node {
    if node.is_settled() {
        return node;
    }
    let id = node.id.clone();
    let what = format!("collection {}", node.name);
    match poll(policy, &what, || remote.get(&id), Node::is_settled) {
        w @ (Waited::Ready(_) | Waited::Exhausted(_)) => w.or(node),
        Waited::Failed(e) => {
            tracing::warn!(collection = %node.name, error = %e, "collection state unknown");
            node
        }
    }
}
