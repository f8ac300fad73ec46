use crate::config::WaitPolicy;
use crate::error::RemoteError;
use crate::remote::{Node, NodeId, Remote};
use crate::wait::poll;

/// Does any package directly inside `collection` already carry a source
/// named `file_name`?
///
/// Packages with no sources may still be processing; they are waited on
/// before their (empty) source list is believed.
pub fn already_uploaded<R: Remote + ?Sized>(
    remote: &mut R,
    collection: &NodeId,
    file_name: &str,
    policy: &WaitPolicy,
) -> Result<bool, RemoteError> {
    for child in remote.list_children(collection)? {
        if child.is_collection() {
            continue;
        }
        let pkg = if child.sources.is_empty() { settle_package(remote, child, policy) } else { child };
        if pkg.sources.is_empty() {
            tracing::debug!(package = %pkg.name, "package settled but has no source list");
        }
        if pkg.source_names().any(|n| n == file_name) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Poll a package until it leaves `Unavailable`. Returns the freshest state
/// seen, or the input if nothing could be fetched.
pub fn settle_package<R: Remote + ?Sized>(remote: &mut R, pkg: Node, policy: &WaitPolicy) -> Node {
    let id = pkg.id.clone();
    let what = format!("package {}", pkg.name);
    poll(policy, &what, || remote.get(&id), Node::is_settled).or(pkg)
}
