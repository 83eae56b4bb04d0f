//! Shared fixtures for integration tests: lopdf-built PDFs and fake collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pdf_inbox::extract::{ExtractError, TextExtractor};
use pdf_inbox::images::ImageExtractor;
use pdf_inbox::inference::{InferenceClient, InferenceError};
use pdf_inbox::models::{ImageContent, ImageFormat, ImageUnit, LogRecord};
use pdf_inbox::ocr::OcrEngine;
use pdf_inbox::result_log::{CsvResultLog, ResultLog};

/// An image XObject to place on a page.
pub enum FixtureImage {
    Gray { width: i64, height: i64, samples: Vec<u8> },
    Rgb { width: i64, height: i64, samples: Vec<u8> },
    Jpeg { width: i64, height: i64, bytes: Vec<u8> },
}

/// One page: optional text drawn in Courier plus image XObjects.
pub struct FixturePage {
    pub text: Option<&'static str>,
    pub images: Vec<FixtureImage>,
}

fn image_stream(image: FixtureImage) -> Stream {
    match image {
        FixtureImage::Gray {
            width,
            height,
            samples,
        } => Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            samples,
        ),
        FixtureImage::Rgb {
            width,
            height,
            samples,
        } => Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            samples,
        ),
        FixtureImage::Jpeg {
            width,
            height,
            bytes,
        } => Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes,
        ),
    }
}

/// Writes a PDF with the given pages to `path`.
pub fn write_pdf(path: &Path, pages: Vec<FixturePage>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut operations = Vec::new();
        if let Some(text) = page.text {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ]);
        }

        let mut xobjects = lopdf::Dictionary::new();
        for (i, image) in page.images.into_iter().enumerate() {
            let name = format!("Im{}", i + 1);
            let image_id: ObjectId = doc.add_object(image_stream(image));
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![100.into(), 0.into(), 0.into(), 100.into(), 72.into(), 400.into()],
                ),
                Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
            xobjects.set(name.into_bytes(), Object::Reference(image_id));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save fixture PDF");
}

/// Baseline JPEG of a solid colour.
pub fn jpeg_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let data: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut buf)
        .encode(&data, width, height, image::ColorType::Rgb8)
        .expect("encode jpeg");
    buf
}

pub fn encoded_unit(document: &str, page_number: u32, image_index: u32) -> ImageUnit {
    ImageUnit {
        document: document.to_string(),
        page_number,
        image_index,
        content: ImageContent::Encoded {
            bytes: vec![0x89, b'P', b'N', b'G'],
            format: ImageFormat::Png,
        },
    }
}

/// Text extractor returning a fixed string.
pub struct FixedText(pub &'static str);

impl TextExtractor for FixedText {
    fn extract_text(&self, _path: &Path) -> Result<String, ExtractError> {
        Ok(self.0.to_string())
    }
}

/// Image extractor returning fixed units, renamed to the processed document.
pub struct FixedImages(pub Vec<ImageUnit>);

impl ImageExtractor for FixedImages {
    fn extract_images(&self, path: &Path) -> Result<Vec<ImageUnit>, ExtractError> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        Ok(self
            .0
            .iter()
            .cloned()
            .map(|mut unit| {
                unit.document = name.clone();
                unit
            })
            .collect())
    }
}

/// OCR engine returning fixed pages and counting how often it ran.
pub struct FixedOcr {
    pub pages: Vec<String>,
    pub runs: Arc<AtomicUsize>,
}

impl FixedOcr {
    pub fn new(pages: &[&str]) -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let ocr = Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            runs: Arc::clone(&runs),
        };
        (ocr, runs)
    }
}

impl OcrEngine for FixedOcr {
    fn recognize_pages(&self, _pdf_path: &Path) -> anyhow::Result<Vec<String>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.clone())
    }
}

/// Truncated PDF that no parser can open.
pub const PARTIAL_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Cat";

/// A call seen by [`FakeClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Tasks(String),
    Image { page: u32, index: u32, placeholder: bool },
}

/// Inference client with scripted answers. Fails the `fail_on`-th call (1-based) when set.
pub struct FakeClient {
    pub calls: Mutex<Vec<Call>>,
    pub fail_on: Mutex<Option<usize>>,
    pub task_answer: &'static str,
}

impl FakeClient {
    pub fn new(task_answer: &'static str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            task_answer,
        }
    }

    pub fn failing_on(self, call: usize) -> Self {
        *self.fail_on.lock().unwrap() = Some(call);
        self
    }

    pub fn heal(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<usize, InferenceError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        let n = calls.len();
        if *self.fail_on.lock().unwrap() == Some(n) {
            return Err(InferenceError::Unreachable("connection refused".to_string()));
        }
        Ok(n)
    }
}

#[async_trait]
impl InferenceClient for FakeClient {
    async fn describe_image(&self, unit: &ImageUnit) -> Result<String, InferenceError> {
        self.record(Call::Image {
            page: unit.page_number,
            index: unit.image_index,
            placeholder: unit.is_placeholder(),
        })?;
        if unit.is_placeholder() {
            return Ok("No images found in the PDF.".to_string());
        }
        Ok(format!(
            "Image on page {} number {}",
            unit.page_number, unit.image_index
        ))
    }

    async fn extract_tasks(&self, text: &str) -> Result<String, InferenceError> {
        self.record(Call::Tasks(text.to_string()))?;
        Ok(self.task_answer.to_string())
    }
}

/// CSV log whose first `failures` appends fail without touching the file.
pub struct FlakyLog {
    pub inner: CsvResultLog,
    pub failures: AtomicUsize,
}

impl ResultLog for FlakyLog {
    fn already_processed(&self, document_name: &str) -> anyhow::Result<bool> {
        self.inner.already_processed(document_name)
    }

    fn append(&self, records: &[LogRecord]) -> anyhow::Result<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("disk full");
        }
        self.inner.append(records)
    }
}

/// Data rows of a CSV log, header excluded.
pub fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}
