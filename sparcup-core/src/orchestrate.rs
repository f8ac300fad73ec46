use crate::config::UploadConfig;
use crate::conform::{conform, ConformReport, UploadOutcome};
use crate::duplicate::already_uploaded;
use crate::expand::{expand, UploadUnit};
use crate::hierarchy::Cursor;
use crate::manifest::ManifestRow;
use crate::progress::Progress;
use crate::remote::{file_name, Node, NodeId, Remote};
use crate::resolve::{resolve, wait_collection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative stop switch, checked before every upload unit.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mutable state of one run, owned by the caller.
pub struct RunContext {
    /// Files uploaded so far; survives a stopped run.
    pub uploaded: usize,
    pub cancel: CancelToken,
    pub progress: Progress,
}

impl RunContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self { uploaded: 0, cancel, progress: Progress::new(false) }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    /// The upload agent failed; remote state is unknown.
    ChannelFailure(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub uploaded: usize,
    /// Units skipped because a file was already there.
    pub duplicates: usize,
    pub failed_units: usize,
    pub file_issues: usize,
    pub conform: ConformReport,
    pub stopped: Option<StopReason>,
}

impl RunSummary {
    pub fn completed(&self) -> bool {
        self.stopped.is_none()
    }
}

/// Drives a manifest pass against one dataset.
pub struct Uploader<'a, R: Remote + ?Sized> {
    remote: &'a mut R,
    cfg: &'a UploadConfig,
    root: Node,
    base: PathBuf,
}

impl<'a, R: Remote + ?Sized> Uploader<'a, R> {
    /// `root` is the dataset collection; relative source expressions are
    /// resolved against `base`.
    pub fn new(remote: &'a mut R, cfg: &'a UploadConfig, root: Node, base: &Path) -> Self {
        Self { remote, cfg, root, base: base.to_path_buf() }
    }

    pub fn run(&mut self, rows: &[ManifestRow], ctx: &mut RunContext) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut cursor = Cursor::default();
        'rows: for row in rows {
            let _span = tracing::info_span!("row", line = row.line).entered();
            cursor = cursor.advance(row, self.cfg);
            self.materialize(&mut cursor);
            let Some(source) = &row.source else { continue };

            let expansion = expand(source, &self.base);
            summary.file_issues += expansion.issues.len();
            let target = cursor.target().cloned().unwrap_or_else(|| self.root.id.clone());
            let dest = match cursor.dest_path() {
                p if p.is_empty() => self.root.name.clone(),
                p => p,
            };
            ctx.progress.set_stage(&dest);
            for unit in &expansion.units {
                if ctx.cancel.is_cancelled() {
                    tracing::warn!("upload cancelled");
                    summary.stopped = Some(StopReason::Cancelled);
                    break 'rows;
                }
                if let Err(stop) = self.upload_unit(unit, &target, &cursor.prefix, &dest, ctx, &mut summary) {
                    summary.stopped = Some(stop);
                    break 'rows;
                }
                ctx.progress.inc_unit();
            }
        }
        summary.uploaded = ctx.uploaded;
        tracing::info!(uploaded = summary.uploaded, completed = summary.completed(), "Uploaded {} files", summary.uploaded);
        summary
    }

    /// Resolve every level the cursor has entered but not yet found remotely.
    fn materialize(&mut self, cursor: &mut Cursor) {
        for level in cursor.unresolved() {
            let parent = cursor.parent_of(level).cloned().unwrap_or_else(|| self.root.id.clone());
            let Some(slot) = cursor.slot_mut(level) else { continue };
            let resolved = resolve(&mut *self.remote, &parent, &slot.name, &self.cfg.collection_wait);
            slot.handle = Some(resolved.id);
        }
    }

    /// Upload one unit and conform what it produced. Only a channel failure
    /// is returned; everything else is logged and counted.
    fn upload_unit(
        &mut self,
        unit: &UploadUnit,
        target: &NodeId,
        prefix: &str,
        dest: &str,
        ctx: &mut RunContext,
        summary: &mut RunSummary,
    ) -> Result<(), StopReason> {
        let names: Vec<String> = unit.files().iter().map(|p| file_name(p)).collect();
        for name in &names {
            match already_uploaded(&mut *self.remote, target, name, &self.cfg.package_wait) {
                Ok(false) => {}
                Ok(true) => {
                    tracing::info!(file = %name, %dest, "already uploaded, delete it remotely to re-upload");
                    summary.duplicates += 1;
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(file = %name, %dest, error = %e, "cannot check for earlier uploads, skipping");
                    summary.failed_units += 1;
                    return Ok(());
                }
            }
        }

        match self.remote.get(target) {
            Ok(node) => {
                wait_collection(&mut *self.remote, node, &self.cfg.collection_wait);
            }
            Err(e) => tracing::warn!(%dest, error = %e, "cannot refresh collection, uploading anyway"),
        }

        tracing::info!(files = ?names, %dest, "uploading");
        let start = Instant::now();
        let channel = self.cfg.channel;
        let result = match unit {
            UploadUnit::Single(path) => self.remote.upload_single(target, path, channel),
            UploadUnit::Group(paths) => self.remote.upload_group(target, paths, channel),
        };
        let elapsed = start.elapsed();
        match result {
            Ok(receipt) => {
                tracing::info!(?elapsed, "upload finished");
                ctx.uploaded += names.len();
                ctx.progress.set_uploaded(ctx.uploaded);
                let outcomes = UploadOutcome::from_receipt(receipt, &names);
                let report = conform(&mut *self.remote, &outcomes, target, prefix, self.cfg);
                summary.conform.merge(&report);
                Ok(())
            }
            Err(e) if e.is_channel_fatal() => {
                tracing::error!(files = ?names, error = %e, "upload agent failed, stopping the run");
                Err(StopReason::ChannelFailure(e.to_string()))
            }
            Err(e) => {
                tracing::error!(files = ?names, %dest, error = %e, ?elapsed, "upload failed");
                summary.failed_units += 1;
                Ok(())
            }
        }
    }
}
