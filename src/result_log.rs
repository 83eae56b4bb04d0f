//! Append-only CSV result log.
//!
//! One row per (document, unit). The header is written once, when the file
//! is first used; after that the file is only ever opened for append. A
//! document's rows go out in a single write so a failed write never leaves a
//! partial batch behind.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::{LogRecord, PipelineKind};

/// Durable store consulted before processing and written after it.
pub trait ResultLog: Send + Sync {
    /// True when any row for `document_name` has been committed.
    fn already_processed(&self, document_name: &str) -> Result<bool>;

    /// Appends all `records` or none of them.
    fn append(&self, records: &[LogRecord]) -> Result<()>;
}

/// Column layout of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSchema {
    /// `timestamp, document, summary`
    Tasks,
    /// `timestamp, document, image, summary`
    Images,
}

const DOCUMENT_COLUMN: &str = "document";

impl LogSchema {
    pub fn for_pipeline(kind: PipelineKind) -> Self {
        match kind {
            PipelineKind::Tasks => LogSchema::Tasks,
            PipelineKind::Images => LogSchema::Images,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            LogSchema::Tasks => &["timestamp", DOCUMENT_COLUMN, "summary"],
            LogSchema::Images => &["timestamp", DOCUMENT_COLUMN, "image", "summary"],
        }
    }

    fn row(&self, record: &LogRecord) -> Vec<String> {
        match self {
            LogSchema::Tasks => vec![
                record.timestamp.clone(),
                record.document_name.clone(),
                record.summary_text.clone(),
            ],
            LogSchema::Images => vec![
                record.timestamp.clone(),
                record.document_name.clone(),
                record.unit_ordinal.to_string(),
                record.summary_text.clone(),
            ],
        }
    }
}

/// [`ResultLog`] backed by a CSV file with a fixed header.
pub struct CsvResultLog {
    path: PathBuf,
    schema: LogSchema,
}

impl CsvResultLog {
    /// Opens the log, creating it with a header if it is absent or empty.
    ///
    /// An existing file whose header differs from `schema` is an error; it is
    /// never rewritten.
    pub fn open(path: &Path, schema: LogSchema) -> Result<Self> {
        let log = Self {
            path: path.to_path_buf(),
            schema,
        };
        log.ensure_initialized()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_initialized(&self) -> Result<()> {
        let is_empty = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat log {}", self.path.display()))
            }
        };

        if is_empty {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("Failed to create log {}", self.path.display()))?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(self.schema.columns())?;
            writer.flush()?;
            info!(path = %self.path.display(), "created result log");
            return Ok(());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open log {}", self.path.display()))?;
        let headers = reader.headers()?;
        let expected = self.schema.columns();
        if headers.iter().ne(expected.iter().copied()) {
            bail!(
                "Log {} has columns [{}], expected [{}]",
                self.path.display(),
                headers.iter().collect::<Vec<_>>().join(", "),
                expected.join(", ")
            );
        }
        Ok(())
    }

    fn serialize(&self, records: &[LogRecord]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            writer.write_record(self.schema.row(record))?;
        }
        writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to serialize log rows: {}", e))
    }
}

impl ResultLog for CsvResultLog {
    fn already_processed(&self, document_name: &str) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open log {}", self.path.display()))?;
        let Some(column) = reader.headers()?.iter().position(|h| h == DOCUMENT_COLUMN) else {
            return Ok(false);
        };
        for (index, row) in reader.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => {
                    return Err(e)
                        .with_context(|| format!("Failed to read log {}", self.path.display()))
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        row = index + 1,
                        error = %e,
                        "skipping unreadable log row"
                    );
                    continue;
                }
            };
            if row.get(column) == Some(document_name) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn append(&self, records: &[LogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure_initialized()?;

        let mut bytes = self.serialize(records)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open log {} for append", self.path.display()))?;
        let original_len = file.metadata()?.len();

        if original_len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(original_len - 1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                bytes.insert(0, b'\n');
            }
        }

        let written = file.write_all(&bytes).and_then(|_| file.sync_data());
        if let Err(e) = written {
            if let Err(rollback) = file.set_len(original_len) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back partial append; log may hold a partial row"
                );
            }
            return Err(e)
                .with_context(|| format!("Failed to append to log {}", self.path.display()));
        }

        debug!(rows = records.len(), path = %self.path.display(), "appended log rows");
        Ok(())
    }
}
