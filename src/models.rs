//! Core data models used throughout the inbox pipeline.
//!
//! These types describe the documents, content units, inference results, and
//! log records that flow from the watcher to the result log.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which interpretation a document receives.
///
/// The two variants share the controller but never run together: `Tasks`
/// reads the text layer and asks for dated tasks, `Images` captions every
/// embedded image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    #[default]
    Tasks,
    Images,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Tasks => "tasks",
            PipelineKind::Images => "images",
        }
    }
}

/// A PDF that passed the input checks and is ready for extraction.
#[derive(Debug, Clone)]
pub struct Document {
    /// Base filename; the dedup key.
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Reason a document was rejected before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Missing,
    NotAFile,
    Unreadable(String),
    Empty,
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Missing => write!(f, "file does not exist"),
            InputError::NotAFile => write!(f, "path is not a regular file"),
            InputError::Unreadable(e) => write!(f, "file is not readable: {}", e),
            InputError::Empty => write!(f, "file is empty"),
        }
    }
}

impl std::error::Error for InputError {}

/// Base filename of `path`, or `None` for paths like `/` or `..`.
pub fn document_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

impl Document {
    /// Checks that `path` exists, is a readable regular file, and is non-empty.
    pub fn inspect(path: &Path) -> Result<Document, InputError> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InputError::Missing)
            }
            Err(e) => return Err(InputError::Unreadable(e.to_string())),
        };
        if !metadata.is_file() {
            return Err(InputError::NotAFile);
        }
        std::fs::File::open(path).map_err(|e| InputError::Unreadable(e.to_string()))?;
        if metadata.len() == 0 {
            return Err(InputError::Empty);
        }
        let name = document_name(path).ok_or(InputError::NotAFile)?;
        Ok(Document {
            name,
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }
}

/// Extracted text of one document, sent as a single task-extraction request.
#[derive(Debug, Clone)]
pub struct TextUnit {
    pub document: String,
    pub raw_text: String,
}

/// Payload of an [`ImageUnit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageContent {
    /// Re-encoded image bytes.
    Encoded { bytes: Vec<u8>, format: ImageFormat },
    /// Sentinel for a document without extractable images.
    NotFound,
}

/// Canonical encoding for extracted images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
        }
    }
}

/// One embedded image, tagged with its 1-based page and 1-based index within the page.
#[derive(Debug, Clone)]
pub struct ImageUnit {
    pub document: String,
    pub page_number: u32,
    pub image_index: u32,
    pub content: ImageContent,
}

impl ImageUnit {
    /// The stand-in unit used when a document has no images. Page and index are 0.
    pub fn placeholder(document: &str) -> Self {
        Self {
            document: document.to_string(),
            page_number: 0,
            image_index: 0,
            content: ImageContent::NotFound,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.content, ImageContent::NotFound)
    }
}

/// One piece of model input. Created per processing pass, never persisted.
#[derive(Debug, Clone)]
pub enum ContentUnit {
    Text(TextUnit),
    Image(ImageUnit),
}

/// The model's answer for one unit.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub document: String,
    /// 1-based position of the unit within its document.
    pub unit_ordinal: u32,
    pub response_text: String,
}

/// A persisted row of the result log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub document_name: String,
    pub unit_ordinal: u32,
    pub summary_text: String,
}

impl LogRecord {
    pub fn from_result(timestamp: &str, result: InferenceResult) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            document_name: result.document,
            unit_ordinal: result.unit_ordinal,
            summary_text: result.response_text,
        }
    }
}
