use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::types::ItemReport;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file
/// then renaming, so readers never observe a half-written batch.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // Replace any previous run's output.
        if target.exists() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

// The on-disk shape of one finished item. Absorbed failures carry their
// reason so empty fields are distinguishable from genuinely empty pages.
#[derive(Serialize)]
struct RecordLine<'a> {
    url: &'a str,
    title: Option<&'a str>,
    text: &'a str,
    failure: Option<String>,
}

/// Write one JSON object per report, in the order given (completion order
/// when fed straight from a batch run).
pub fn write_jsonl(
    dir: &Path,
    filename: &str,
    reports: &[ItemReport],
) -> Result<PathBuf, PersistError> {
    let mut buffer = String::new();
    for report in reports {
        let line = RecordLine {
            url: &report.record.url,
            title: report.record.title.as_deref(),
            text: &report.record.text,
            failure: report.failure.as_ref().map(|kind| kind.to_string()),
        };
        buffer.push_str(&serde_json::to_string(&line)?);
        buffer.push('\n');
    }
    AtomicFileWriter::new(dir.to_path_buf()).write(filename, &buffer)
}
