//! Renaming uploaded packages to the dataset naming convention.
//!
//! The remote may strip well-known extensions from package names, so two
//! uploads sharing a stem would collide. The extensions are rebuilt from the
//! package's sources and appended to keep names unique.

use crate::config::UploadConfig;
use crate::duplicate::settle_package;
use crate::remote::{Node, NodeId, Remote, UploadReceipt};
use serde::Serialize;
use std::collections::HashSet;

/// How to find the package an upload produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The upload call reported the package id.
    Identified(NodeId),
    /// Nothing came back; search the collection for this local file name.
    NeedsLookup(String),
}

impl UploadOutcome {
    pub fn from_receipt(receipt: UploadReceipt, file_names: &[String]) -> Vec<UploadOutcome> {
        match receipt {
            UploadReceipt::Packages(ids) => ids.into_iter().map(UploadOutcome::Identified).collect(),
            UploadReceipt::Detached => file_names.iter().cloned().map(UploadOutcome::NeedsLookup).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConformReport {
    pub renamed: usize,
    pub unchanged: usize,
    pub protected: usize,
    pub failed: usize,
}

impl ConformReport {
    pub fn merge(&mut self, other: &ConformReport) {
        self.renamed += other.renamed;
        self.unchanged += other.unchanged;
        self.protected += other.protected;
        self.failed += other.failed;
    }
}

/// `_ext` for every distinct extension among the package's sources, in
/// first-seen order. Sources whose base name is `base` are skipped.
pub fn extension_suffix(pkg: &Node, base: &str) -> String {
    let mut seen = HashSet::new();
    let mut suffix = String::new();
    for name in pkg.source_names() {
        if name == base {
            continue;
        }
        let Some((stem, ext)) = name.rsplit_once('.') else { continue };
        if stem.is_empty() || ext.is_empty() {
            continue;
        }
        if seen.insert(ext) {
            suffix.push('_');
            suffix.push_str(ext);
        }
    }
    suffix
}

/// Conforming name for `pkg`. A prefix or suffix that is already in place is
/// not added again, so a conforming name maps to itself.
pub fn target_name(pkg: &Node, prefix: &str, add_extension: bool) -> String {
    let bare = pkg.name.strip_prefix(prefix).unwrap_or(&pkg.name);
    let mut name = format!("{prefix}{bare}");
    if add_extension {
        let suffix = extension_suffix(pkg, bare);
        if !bare.ends_with(&suffix) {
            name.push_str(&suffix);
        }
    }
    name
}

/// Rename everything an upload produced. Per-package failures are logged and
/// counted, never returned.
pub fn conform<R: Remote + ?Sized>(
    remote: &mut R,
    outcomes: &[UploadOutcome],
    collection: &NodeId,
    prefix: &str,
    cfg: &UploadConfig,
) -> ConformReport {
    let mut report = ConformReport::default();
    let mut seen = HashSet::new();
    for outcome in outcomes {
        let pkg = match outcome {
            UploadOutcome::Identified(id) => match remote.get(id) {
                Ok(pkg) => pkg,
                Err(e) => {
                    tracing::error!(package = %id, error = %e, "cannot fetch uploaded package, not renamed");
                    report.failed += 1;
                    continue;
                }
            },
            UploadOutcome::NeedsLookup(file) => {
                if cfg.is_protected(file) {
                    report.protected += 1;
                    continue;
                }
                match find_by_source(remote, collection, file, cfg) {
                    Some(pkg) => pkg,
                    None => {
                        tracing::error!(%file, %collection, "could not find the uploaded file in a package, not renamed");
                        report.failed += 1;
                        continue;
                    }
                }
            }
        };
        if !seen.insert(pkg.id.clone()) {
            continue;
        }
        if cfg.is_protected(&pkg.name) {
            tracing::debug!(package = %pkg.name, "protected name, not renamed");
            report.protected += 1;
            continue;
        }
        let pkg = settle_package(remote, pkg, &cfg.package_wait);
        // The service may have stripped the extension off a protected name.
        if cfg.is_protected(&pkg.name) || pkg.source_names().any(|n| cfg.is_protected(n)) {
            report.protected += 1;
            continue;
        }
        rename_package(remote, &pkg, prefix, cfg, &mut report);
    }
    report
}

fn find_by_source<R: Remote + ?Sized>(
    remote: &mut R,
    collection: &NodeId,
    file: &str,
    cfg: &UploadConfig,
) -> Option<Node> {
    let children = match remote.list_children(collection) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(%collection, error = %e, "cannot list collection");
            return None;
        }
    };
    children.into_iter().filter(|c| !c.is_collection()).find_map(|child| {
        let pkg = if child.sources.is_empty() { settle_package(remote, child, &cfg.package_wait) } else { child };
        let found = pkg.source_names().any(|n| n == file);
        found.then_some(pkg)
    })
}

fn rename_package<R: Remote + ?Sized>(
    remote: &mut R,
    pkg: &Node,
    prefix: &str,
    cfg: &UploadConfig,
    report: &mut ConformReport,
) {
    let new_name = target_name(pkg, prefix, cfg.add_extension);
    if new_name == pkg.name {
        tracing::info!(package = %pkg.name, "not renamed");
        report.unchanged += 1;
        return;
    }
    tracing::info!(from = %pkg.name, to = %new_name, "renaming");
    match remote.rename(&pkg.id, &new_name) {
        Ok(()) => report.renamed += 1,
        Err(e) => {
            tracing::error!(package = %pkg.name, error = %e, "rename failed");
            report.failed += 1;
        }
    }
}
