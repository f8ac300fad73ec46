use sparcup_core::config::WaitPolicy;
use sparcup_core::memory::MemoryRemote;
use sparcup_core::remote::{NodeState, Remote};
use sparcup_core::resolve::resolve;
use std::time::Duration;

fn quick(attempts: u32) -> WaitPolicy {
    WaitPolicy::new(attempts, Duration::ZERO)
}

#[test]
fn resolving_twice_creates_once() {
    let mut remote = MemoryRemote::new();
    let root = remote.add_dataset("DS");

    let first = resolve(&mut remote, &root, "primary/sub-01/anat", &quick(5)).id;
    let second = resolve(&mut remote, &root, "primary/sub-01/anat", &quick(5)).id;

    assert_eq!(first, second);
    assert_eq!(remote.creates.len(), 3);
    assert_eq!(remote.lookup(&root, "primary/sub-01/anat").unwrap().id, first);
}

#[test]
fn empty_segments_are_ignored() {
    let mut remote = MemoryRemote::new();
    let root = remote.add_dataset("DS");

    let id = resolve(&mut remote, &root, "/primary//sub-01/", &quick(5)).id;

    assert_eq!(remote.lookup(&root, "primary/sub-01").unwrap().id, id);
    assert_eq!(resolve(&mut remote, &root, "", &quick(5)).id, root);
}

#[test]
fn package_with_the_same_name_is_not_a_collection() {
    let mut remote = MemoryRemote::new();
    let root = remote.add_dataset("DS");
    let pkg = remote.add_package(&root, "anat", &["x/anat"], NodeState::Ready);

    let id = resolve(&mut remote, &root, "anat", &quick(5)).id;

    assert_ne!(id, pkg);
    assert!(remote.node(&id).unwrap().is_collection());
    assert_eq!(remote.creates, vec![(root.clone(), "anat".to_string())]);
}

#[test]
fn waits_for_new_collections_to_become_ready() {
    let mut remote = MemoryRemote::new();
    remote.settle_after = 3;
    let root = remote.add_dataset("DS");

    let id = resolve(&mut remote, &root, "primary/sub-01", &quick(10)).id;

    assert_eq!(remote.node(&id).unwrap().state, NodeState::Ready);
    let top = remote.lookup(&root, "primary").unwrap();
    assert_eq!(top.state, NodeState::Ready);
}

#[test]
fn exhausted_wait_still_returns_the_handle() {
    let mut remote = MemoryRemote::new();
    remote.settle_after = 50;
    let root = remote.add_dataset("DS");

    let id = resolve(&mut remote, &root, "primary", &quick(2)).id;

    let node = remote.get(&id).unwrap();
    assert_eq!(node.name, "primary");
    assert_eq!(node.state, NodeState::Creating);
}

#[test]
fn create_failure_returns_the_last_good_collection() {
    let mut remote = MemoryRemote::new();
    remote.fail_create.insert("sub-01".into());
    let root = remote.add_dataset("DS");

    let resolved = resolve(&mut remote, &root, "primary/sub-01/anat", &quick(5));

    // anat ends up directly under primary.
    let primary = remote.lookup(&root, "primary").unwrap().id.clone();
    assert_eq!(remote.lookup(&root, "primary/anat").unwrap().id, resolved.id);
    assert_eq!(resolved.skipped, vec!["sub-01".to_string()]);
    assert_eq!(remote.creates, vec![(root.clone(), "primary".to_string()), (primary, "anat".to_string())]);
}

#[test]
fn clean_resolve_skips_nothing() {
    let mut remote = MemoryRemote::new();
    let root = remote.add_dataset("DS");

    let resolved = resolve(&mut remote, &root, "primary/sub-01", &quick(5));

    assert!(resolved.skipped.is_empty());
    assert_eq!(remote.lookup(&root, "primary/sub-01").unwrap().id, resolved.id);
}

#[test]
fn every_failed_segment_is_reported() {
    let mut remote = MemoryRemote::new();
    remote.fail_create.insert("sub-01".into());
    remote.fail_create.insert("ses-1".into());
    let root = remote.add_dataset("DS");

    let resolved = resolve(&mut remote, &root, "primary/sub-01/ses-1/anat", &quick(5));

    assert_eq!(resolved.skipped, vec!["sub-01".to_string(), "ses-1".to_string()]);
    assert_eq!(remote.lookup(&root, "primary/anat").unwrap().id, resolved.id);
}
