use crate::error::FileIssue;
use crate::manifest::Manifest;
use globset::GlobBuilder;
use std::path::{Path, PathBuf};

const WILDCARDS: [char; 2] = ['*', '?'];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadUnit {
    Single(PathBuf),
    /// Uploaded in one call, all or nothing.
    Group(Vec<PathBuf>),
}

impl UploadUnit {
    pub fn files(&self) -> &[PathBuf] {
        match self {
            UploadUnit::Single(p) => std::slice::from_ref(p),
            UploadUnit::Group(ps) => ps,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    pub units: Vec<UploadUnit>,
    pub issues: Vec<FileIssue>,
}

/// Turn one source cell into upload units.
///
/// `[a,b]` keeps the pooled matches of several expressions together as one
/// group; without brackets every match is uploaded on its own. Wildcards are
/// only honoured in the last path component.
pub fn expand(cell: &str, base: &Path) -> Expansion {
    let cell = cell.trim();
    let (body, keep_together) = match cell.strip_prefix('[').and_then(|c| c.strip_suffix(']')) {
        Some(inner) => (inner, true),
        None => (cell, false),
    };
    let exprs: Vec<&str> = body.split(',').map(str::trim).filter(|e| !e.is_empty()).collect();

    let mut out = Expansion::default();
    let mut pooled = Vec::new();
    for expr in &exprs {
        match expand_expr(expr, base) {
            Ok(files) if files.is_empty() => {
                tracing::warn!(%expr, "no files match, skipping");
                out.issues.push(FileIssue::NoMatch { expr: expr.to_string() });
            }
            Ok(files) if exprs.len() > 1 => pooled.extend(files),
            Ok(files) => out.units.extend(files.into_iter().map(UploadUnit::Single)),
            Err(issue) => {
                tracing::warn!(%expr, %issue, "skipping file expression");
                out.issues.push(issue);
            }
        }
    }
    if !pooled.is_empty() {
        if keep_together {
            out.units.push(UploadUnit::Group(pooled));
        } else {
            out.units.extend(pooled.into_iter().map(UploadUnit::Single));
        }
    }
    out
}

/// Expand every source cell of the manifest and collect all issues, before
/// anything is uploaded.
pub fn preflight(manifest: &Manifest, base: &Path) -> Vec<(usize, FileIssue)> {
    manifest
        .sources()
        .flat_map(|(line, cell)| expand(cell, base).issues.into_iter().map(move |i| (line, i)))
        .collect()
}

fn expand_expr(expr: &str, base: &Path) -> Result<Vec<PathBuf>, FileIssue> {
    let path = base.join(expr);
    let (dir, name) = match (path.parent(), path.file_name()) {
        (Some(d), Some(n)) => (d.to_path_buf(), n.to_string_lossy().into_owned()),
        _ => return Err(FileIssue::NoMatch { expr: expr.to_string() }),
    };
    let expr_dir = Path::new(expr).parent().map(|d| d.to_string_lossy().into_owned()).unwrap_or_default();
    if expr_dir.contains(WILDCARDS) {
        return Err(FileIssue::WildcardInDirectory { expr: expr.to_string() });
    }
    if !name.contains(WILDCARDS) {
        return Ok(if path.is_file() { vec![path] } else { Vec::new() });
    }

    let matcher = GlobBuilder::new(&name)
        .literal_separator(true)
        .build()
        .map_err(|e| FileIssue::BadPattern { expr: expr.to_string(), message: e.to_string() })?
        .compile_matcher();
    let hidden_ok = name.starts_with('.');
    let mut found = Vec::new();
    for ent in walkdir::WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let Ok(ent) = ent else { continue };
        if !ent.file_type().is_file() {
            continue;
        }
        let fname = ent.file_name().to_string_lossy();
        if fname.starts_with('.') && !hidden_ok {
            continue;
        }
        if matcher.is_match(fname.as_ref()) {
            found.push(ent.path().to_path_buf());
        }
    }
    found.sort();
    Ok(found)
}
