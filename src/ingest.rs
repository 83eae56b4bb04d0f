//! Ingestion controller.
//!
//! Turns a file-creation event into log rows. Per document the controller
//! moves through `Extracting → Inferring → Committing` and ends either
//! committed or skipped. Documents are processed one at a time, so the
//! result log has a single writer and needs no locking.
//!
//! Guarantees:
//! - a document with any committed row is never processed again;
//! - if any inference call for a document fails, none of its rows are written;
//! - all rows of one document share a single timestamp.

use anyhow::{Context, Result};
use chrono::Local;
use globset::GlobSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::extract::{PdfTextExtractor, TextExtractor};
use crate::images::{ImageExtractor, PdfImageExtractor};
use crate::inference::{InferenceClient, InferenceError, OllamaClient};
use crate::models::{
    document_name, ContentUnit, Document, ImageUnit, InferenceResult, InputError, LogRecord,
    PipelineKind, TextUnit,
};
use crate::ocr::{CliOcr, OcrEngine};
use crate::result_log::{CsvResultLog, LogSchema, ResultLog};
use crate::tasks::parse_task_lines;
use crate::watch::{existing_files, watch_directory, WatchEvent};

/// Timestamp format of the `timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Processing stage of the current document, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Extracting,
    Inferring,
    Committing,
    Skipped,
}

/// Why a document produced no rows.
#[derive(Debug)]
pub enum SkipReason {
    AlreadyProcessed,
    Input(InputError),
    Extraction(String),
    Inference { unit: u32, error: InferenceError },
    Storage(anyhow::Error),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyProcessed => write!(f, "already processed"),
            SkipReason::Input(e) => write!(f, "input error: {}", e),
            SkipReason::Extraction(e) => write!(f, "extraction error: {}", e),
            SkipReason::Inference { unit, error } => {
                write!(f, "inference failed for unit {}: {}", unit, error)
            }
            SkipReason::Storage(e) => write!(f, "storage error: {:#}", e),
        }
    }
}

/// Terminal result of handling one event.
#[derive(Debug)]
pub enum Outcome {
    /// Directory, or a file not matching the include globs.
    Ignored,
    Committed { document: String, rows: usize },
    Skipped { document: String, reason: SkipReason },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ignored => write!(f, "ignored"),
            Outcome::Committed { document, rows } => {
                write!(f, "{}: logged {} row(s)", document, rows)
            }
            Outcome::Skipped { document, reason } => write!(f, "{}: skipped ({})", document, reason),
        }
    }
}

/// The components a controller drives.
pub struct Collaborators {
    pub text: Arc<dyn TextExtractor>,
    pub images: Arc<dyn ImageExtractor>,
    pub inference: Arc<dyn InferenceClient>,
    pub log: Arc<dyn ResultLog>,
}

pub struct IngestionController {
    kind: PipelineKind,
    include: GlobSet,
    parts: Collaborators,
}

impl IngestionController {
    pub fn new(kind: PipelineKind, include: GlobSet, parts: Collaborators) -> Self {
        Self {
            kind,
            include,
            parts,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// True for non-directory events whose base filename matches the include globs.
    pub fn is_candidate(&self, event: &WatchEvent) -> bool {
        if event.is_dir {
            return false;
        }
        document_name(&event.path)
            .map(|name| self.include.is_match(name))
            .unwrap_or(false)
    }

    /// Handles one event to completion.
    pub async fn process(&self, event: &WatchEvent) -> Outcome {
        if !self.is_candidate(event) {
            return Outcome::Ignored;
        }
        let Some(name) = document_name(&event.path) else {
            return Outcome::Ignored;
        };

        match self.parts.log.already_processed(&name) {
            Ok(false) => {}
            Ok(true) => {
                info!(document = %name, "already logged; skipping");
                return self.skip(name, SkipReason::AlreadyProcessed);
            }
            Err(e) => return self.skip(name, SkipReason::Storage(e)),
        }

        info!(document = %name, pipeline = self.kind.as_str(), "processing new PDF");

        self.enter(&name, DocumentState::Extracting);
        let document = match Document::inspect(&event.path) {
            Ok(doc) => doc,
            Err(e) => return self.skip(name, SkipReason::Input(e)),
        };
        debug!(document = %name, bytes = document.size, "input checks passed");
        let units = match self.extract_units(&document).await {
            Ok(units) => units,
            Err(e) => return self.skip(name, SkipReason::Extraction(e)),
        };

        self.enter(&name, DocumentState::Inferring);
        let mut results = Vec::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            let ordinal = index as u32 + 1;
            let response = match unit {
                ContentUnit::Text(text) => self.parts.inference.extract_tasks(&text.raw_text).await,
                ContentUnit::Image(image) => self.parts.inference.describe_image(image).await,
            };
            match response {
                Ok(response_text) => {
                    debug!(document = %name, unit = ordinal, "inference succeeded");
                    results.push(InferenceResult {
                        document: name.clone(),
                        unit_ordinal: ordinal,
                        response_text,
                    });
                }
                Err(error) => {
                    return self.skip(
                        name,
                        SkipReason::Inference {
                            unit: ordinal,
                            error,
                        },
                    )
                }
            }
        }

        if self.kind == PipelineKind::Tasks {
            for result in &results {
                check_task_format(&name, &result.response_text);
            }
        }

        self.enter(&name, DocumentState::Committing);
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let records: Vec<LogRecord> = results
            .into_iter()
            .map(|result| LogRecord::from_result(&timestamp, result))
            .collect();

        if let Err(e) = self.parts.log.append(&records) {
            return self.skip(name, SkipReason::Storage(e));
        }

        info!(document = %name, rows = records.len(), timestamp = %timestamp, "logged");
        Outcome::Committed {
            document: name,
            rows: records.len(),
        }
    }

    /// Pulls events until the channel closes, one document at a time.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<WatchEvent>, settle: Duration) {
        while let Some(event) = events.recv().await {
            if !self.is_candidate(&event) {
                debug!(path = %event.path.display(), "ignoring event");
                continue;
            }
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
            let outcome = self.process(&event).await;
            debug!(outcome = %outcome, "event handled");
        }
    }

    async fn extract_units(&self, document: &Document) -> Result<Vec<ContentUnit>, String> {
        let path = document.path.clone();
        match self.kind {
            PipelineKind::Tasks => {
                let extractor = Arc::clone(&self.parts.text);
                let raw_text = tokio::task::spawn_blocking(move || extractor.extract_text(&path))
                    .await
                    .map_err(|e| e.to_string())?
                    .map_err(|e| e.to_string())?;
                if raw_text.trim().is_empty() {
                    warn!(document = %document.name, "no extractable text");
                }
                Ok(vec![ContentUnit::Text(TextUnit {
                    document: document.name.clone(),
                    raw_text,
                })])
            }
            PipelineKind::Images => {
                let extractor = Arc::clone(&self.parts.images);
                let images = tokio::task::spawn_blocking(move || extractor.extract_images(&path))
                    .await
                    .map_err(|e| e.to_string())?
                    .map_err(|e| e.to_string())?;
                if images.is_empty() {
                    info!(document = %document.name, "no images found; using placeholder");
                    return Ok(vec![ContentUnit::Image(ImageUnit::placeholder(
                        &document.name,
                    ))]);
                }
                Ok(images.into_iter().map(ContentUnit::Image).collect())
            }
        }
    }

    fn enter(&self, document: &str, state: DocumentState) {
        debug!(document = %document, state = ?state, "state change");
    }

    fn skip(&self, document: String, reason: SkipReason) -> Outcome {
        self.enter(&document, DocumentState::Skipped);
        match &reason {
            SkipReason::AlreadyProcessed => {}
            SkipReason::Input(_) | SkipReason::Extraction(_) => {
                warn!(document = %document, reason = %reason, "document skipped")
            }
            SkipReason::Inference { .. } | SkipReason::Storage(_) => {
                error!(document = %document, reason = %reason, "document skipped; nothing logged")
            }
        }
        Outcome::Skipped { document, reason }
    }
}

/// Warns about response lines that are not `YYYY-MM-DD, description`.
fn check_task_format(document: &str, response: &str) {
    let parsed = parse_task_lines(response);
    for line in &parsed.rejected {
        warn!(document = %document, line = %line, "response line is not 'YYYY-MM-DD, task'");
    }
    debug!(
        document = %document,
        tasks = parsed.tasks.len(),
        rejected = parsed.rejected.len(),
        "task format check"
    );
}

/// Builds a controller from configuration with the production components.
pub async fn controller_from_config(config: &Config) -> Result<IngestionController> {
    let kind = config.pipeline.kind;
    let log = CsvResultLog::open(&config.log.path, LogSchema::for_pipeline(kind))?;
    info!(path = %log.path().display(), "using result log");

    let client = OllamaClient::new(&config.inference, &config.pipeline)?;
    check_models(&client).await;

    let ocr: Option<Box<dyn OcrEngine>> = if config.ocr.enabled {
        Some(Box::new(CliOcr::new(&config.ocr)))
    } else {
        None
    };

    let parts = Collaborators {
        text: Arc::new(PdfTextExtractor::new(ocr)),
        images: Arc::new(PdfImageExtractor::new()),
        inference: Arc::new(client),
        log: Arc::new(log),
    };
    Ok(IngestionController::new(
        kind,
        config.watch.include_set()?,
        parts,
    ))
}

/// Logs the models available on the host. Failure is not fatal: the service
/// may come up after the watcher does.
async fn check_models(client: &OllamaClient) {
    match client.list_models().await {
        Ok(models) => {
            info!(models = ?models, "available models");
            if !models.iter().any(|m| m == client.model()) {
                warn!(model = %client.model(), "configured model is not installed on the host");
            }
        }
        Err(e) => warn!(error = %format!("{:#}", e), "could not list models"),
    }
}

/// Watches the configured directory until Ctrl-C.
pub async fn run_watch(config: &Config) -> Result<()> {
    let controller = controller_from_config(config).await?;
    let dir = &config.watch.dir;
    let (watcher, events) = watch_directory(dir)?;
    info!(dir = %dir.display(), pipeline = controller.kind().as_str(), "watching folder");

    let settle = Duration::from_millis(config.watch.settle_millis);

    if config.watch.scan_existing {
        for event in existing_files(dir)? {
            if controller.is_candidate(&event) {
                let outcome = controller.process(&event).await;
                debug!(outcome = %outcome, "startup scan");
            }
        }
    }

    tokio::select! {
        _ = controller.run(events, settle) => {
            warn!("watch event stream closed");
        }
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl-C")?;
            info!("interrupted; stopping watcher");
        }
    }

    drop(watcher);
    Ok(())
}

/// Processes the given files once, with the same dedup and commit rules as the watcher.
pub async fn run_process(config: &Config, paths: &[impl AsRef<Path>]) -> Result<()> {
    let controller = controller_from_config(config).await?;

    let mut committed = 0usize;
    let mut skipped = 0usize;
    for path in paths {
        let event = WatchEvent::created(path.as_ref());
        let outcome = controller.process(&event).await;
        match &outcome {
            Outcome::Committed { .. } => committed += 1,
            Outcome::Skipped { .. } => skipped += 1,
            Outcome::Ignored => {}
        }
        println!("{}", describe(&event, &outcome));
    }

    println!("process ({})", controller.kind().as_str());
    println!("  committed: {}", committed);
    println!("  skipped: {}", skipped);
    println!("ok");
    Ok(())
}

fn describe(event: &WatchEvent, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Ignored => format!("{}: ignored", event.path.display()),
        other => other.to_string(),
    }
}
