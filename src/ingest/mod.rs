//! Batch access-log ingestor.
//!
//! Scans the input directory for batch files, applies each one through
//! the sink, and routes the file to the archive or error directory. Files
//! are processed strictly one at a time in ascending name order; a failing
//! file is contained to itself and never aborts the run. Concurrent runs
//! against the same input directory are prevented by the external
//! scheduler, not here.

mod parser;
mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::config::IngestSettings;

pub use parser::{parse_batch, AccessBatch, AccessEntry, ParseError};
pub use sink::{AccessLogSink, SinkError, StoreSink};

/// Why a single file was routed to the error directory.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse failure: {0}")]
    Parse(#[from] ParseError),

    #[error("sink failure: {0}")]
    Sink(#[from] SinkError),
}

/// Outcome of one ingest run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub archived: usize,
    pub errored: usize,
}

/// The batch ingestor.
pub struct AccessLogIngestor {
    input_dir: PathBuf,
    archive_dir: PathBuf,
    error_dir: PathBuf,
    pattern: FilePattern,
    sink: Arc<dyn AccessLogSink>,
}

impl AccessLogIngestor {
    pub fn new(settings: &IngestSettings, sink: Arc<dyn AccessLogSink>) -> Self {
        Self {
            input_dir: settings.input_dir.clone(),
            archive_dir: settings.archive_dir.clone(),
            error_dir: settings.error_dir.clone(),
            pattern: FilePattern::parse(&settings.file_pattern),
            sink,
        }
    }

    /// Process every pending batch file once.
    pub async fn run_once(&self) -> anyhow::Result<IngestReport> {
        std::fs::create_dir_all(&self.input_dir)?;
        std::fs::create_dir_all(&self.archive_dir)?;
        std::fs::create_dir_all(&self.error_dir)?;

        let files = self.pending_files()?;
        if files.is_empty() {
            info!("no batch files to process");
            return Ok(IngestReport::default());
        }

        let mut report = IngestReport::default();
        for path in files {
            let file_name = match path.file_name() {
                Some(name) => name.to_os_string(),
                None => continue,
            };

            match self.process_file(&path).await {
                Ok(entries) => {
                    info!(file = %file_name.to_string_lossy(), entries, "batch applied");
                    move_replace(&path, &self.archive_dir.join(&file_name))?;
                    report.archived += 1;
                }
                Err(e) => {
                    error!(file = %file_name.to_string_lossy(), "batch failed: {}", e);
                    move_replace(&path, &self.error_dir.join(&file_name))?;
                    report.errored += 1;
                }
            }
        }

        info!(
            archived = report.archived,
            errored = report.errored,
            "ingest run finished"
        );
        Ok(report)
    }

    /// Input files matching the pattern, sorted ascending by name for
    /// deterministic sequential processing.
    fn pending_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.input_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| self.pattern.matches(n))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    async fn process_file(&self, path: &Path) -> Result<usize, IngestError> {
        let raw = std::fs::read_to_string(path)?;
        let batch = parse_batch(&raw)?;
        self.sink
            .submit_batch(batch.batch_date, &batch.entries)
            .await?;
        Ok(batch.entries.len())
    }
}

/// Move a file, creating destination directories as needed and replacing
/// a pre-existing destination file. Safe to repeat.
fn move_replace(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if dst.exists() {
        std::fs::remove_file(dst)?;
    }
    std::fs::rename(src, dst)
}

/// File name pattern with at most one `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FilePattern {
    prefix: String,
    suffix: Option<String>,
}

impl FilePattern {
    fn parse(pattern: &str) -> Self {
        match pattern.split_once('*') {
            Some((prefix, suffix)) => Self {
                prefix: prefix.to_string(),
                suffix: Some(suffix.to_string()),
            },
            None => Self {
                prefix: pattern.to_string(),
                suffix: None,
            },
        }
    }

    fn matches(&self, name: &str) -> bool {
        match &self.suffix {
            Some(suffix) => {
                name.len() >= self.prefix.len() + suffix.len()
                    && name.starts_with(&self.prefix)
                    && name.ends_with(suffix)
            }
            None => name == self.prefix,
        }
    }
}
