use crate::error::ManifestError;
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Rows before the one carrying the dataset name.
pub const ROWS_TO_NAME: usize = 3;
/// Rows before the first upload directive.
pub const ROWS_TO_DIRECTIVES: usize = 4;

const DATASET_COL: usize = 0;
const TOP_COL: usize = 0;
const SUBJECT_COL: usize = 1;
const SESSION_COL: usize = 2;
const FOLDER_COL: usize = 3;
const SOURCE_COL: usize = 4;

/// One upload directive. `None` means the cell was blank: keep the current
/// context at that level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ManifestRow {
    /// 1-based line in the manifest file.
    pub line: usize,
    pub top: Option<String>,
    pub subject: Option<String>,
    pub session: Option<String>,
    pub folder: Option<String>,
    pub source: Option<String>,
}

impl ManifestRow {
    fn from_record(line: usize, rec: &StringRecord) -> Self {
        Self {
            line,
            top: cell(rec, TOP_COL),
            subject: cell(rec, SUBJECT_COL),
            session: cell(rec, SESSION_COL),
            folder: cell(rec, FOLDER_COL),
            source: cell(rec, SOURCE_COL),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Manifest {
    pub path: PathBuf,
    pub dataset: String,
    pub rows: Vec<ManifestRow>,
}

impl Manifest {
    /// Read the whole manifest. Any unreadable row or a blank dataset name is
    /// fatal; nothing is returned partially.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let data =
            fs::read(path).map_err(|e| ManifestError::Open { path: path.to_path_buf(), source: e.into() })?;
        let mut reader = ReaderBuilder::new().has_headers(false).flexible(true).from_reader(data.as_slice());

        let mut dataset = None;
        let mut rows = Vec::new();
        let mut rec = StringRecord::new();
        // 0-based row index counting blank lines, which the reader skips.
        let mut idx = 0usize;
        let (mut scanned, mut newlines) = (0usize, 0usize);
        loop {
            let more = reader
                .read_record(&mut rec)
                .map_err(|source| ManifestError::Row { path: path.to_path_buf(), row: idx + 1, source })?;
            if !more {
                break;
            }
            let start = rec.position().map_or(0, |p| p.byte() as usize);
            let (blanks, begin) = skip_blank_lines(&data, start);
            idx += blanks;
            newlines += data.get(scanned..begin).map_or(0, |s| s.iter().filter(|b| **b == b'\n').count());
            scanned = scanned.max(begin);
            if idx == ROWS_TO_NAME {
                dataset = cell(&rec, DATASET_COL);
            } else if idx > ROWS_TO_NAME {
                rows.push(ManifestRow::from_record(newlines + 1, &rec));
            }
            idx += 1;
        }

        let dataset = dataset.ok_or_else(|| ManifestError::MissingDataset {
            path: path.to_path_buf(),
            row: ROWS_TO_NAME + 1,
        })?;
        tracing::debug!(manifest = %path.display(), %dataset, rows = rows.len(), "manifest read");
        Ok(Self { path: path.to_path_buf(), dataset, rows })
    }

    /// Every non-blank source expression with the line it came from.
    pub fn sources(&self) -> impl Iterator<Item = (usize, &str)> {
        self.rows.iter().filter_map(|r| r.source.as_deref().map(|s| (r.line, s)))
    }
}

/// Count the empty lines in front of the record the reader reports at byte
/// `start`. Returns the count and the offset where the record really begins.
fn skip_blank_lines(data: &[u8], start: usize) -> (usize, usize) {
    let mut pos = start;
    // The `\n` of a CRLF that ended the previous record is read with this one.
    if pos > 0 && data.get(pos - 1) == Some(&b'\r') && data.get(pos) == Some(&b'\n') {
        pos += 1;
    }
    let mut blanks = 0;
    loop {
        match data.get(pos..).unwrap_or_default() {
            [b'\r', b'\n', ..] => pos += 2,
            [b'\n', ..] | [b'\r', ..] => pos += 1,
            _ => return (blanks, pos),
        }
        blanks += 1;
    }
}

/// Trimmed cell value, `None` when missing or blank.
fn cell(rec: &StringRecord, col: usize) -> Option<String> {
    let v = rec.get(col)?.trim().trim_start_matches('\u{feff}');
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}
