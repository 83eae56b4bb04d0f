//! OCR fallback for PDFs without a text layer.
//!
//! Pages are rasterized with `pdftoppm` and recognized with `tesseract`,
//! both invoked as external processes. Neither tool is linked; a missing
//! binary shows up as an error from [`OcrEngine::recognize_pages`].

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::OcrConfig;

/// Turns every page of a PDF into text.
pub trait OcrEngine: Send + Sync {
    /// Returns one string per page, in page order. A page that could not be
    /// recognized is an empty string; an error means nothing was recognized.
    fn recognize_pages(&self, pdf_path: &Path) -> Result<Vec<String>>;
}

/// `pdftoppm` + `tesseract` command-line OCR.
pub struct CliOcr {
    language: String,
    dpi: u32,
}

impl CliOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            dpi: config.dpi,
        }
    }
}

/// Private directory for rasterized pages, removed when dropped.
fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("pdf_inbox_ocr_")
        .tempdir()
        .context("failed to create OCR scratch dir")
}

impl OcrEngine for CliOcr {
    fn recognize_pages(&self, pdf_path: &Path) -> Result<Vec<String>> {
        let scratch = scratch_dir()?;
        let prefix = scratch.path().join("page");

        let output = Command::new("pdftoppm")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftoppm returned non-zero exit status for {}: {}",
                pdf_path.display(),
                stderr.trim()
            );
        }

        let images = rendered_pages(scratch.path())?;
        if images.is_empty() {
            bail!("pdftoppm produced no page images for {}", pdf_path.display());
        }
        debug!(pages = images.len(), path = %pdf_path.display(), "rasterized pages for OCR");

        let mut pages = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            match self.recognize_image(image) {
                Ok(text) => pages.push(text),
                Err(e) => {
                    warn!(
                        path = %pdf_path.display(),
                        page = index + 1,
                        error = %e,
                        "OCR failed for page"
                    );
                    pages.push(String::new());
                }
            }
        }
        Ok(pages)
    }
}

impl CliOcr {
    fn recognize_image(&self, png_path: &Path) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(png_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .with_context(|| format!("failed to execute tesseract for {}", png_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "tesseract returned non-zero exit status for {}: {}",
                png_path.display(),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .replace('\u{0000}', "")
            .trim()
            .to_string())
    }
}

/// PNGs written by `pdftoppm`, ordered by page number.
///
/// `pdftoppm` zero-pads the page suffix to the width of the page count
/// (`page-1.png` or `page-01.png`), so the suffix is sorted numerically.
fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        if let Some(number) = page_suffix(&path) {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_suffix(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once('-')?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_pages_sort_numerically() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["page-10.png", "page-02.png", "page-01.png", "notes.txt"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        let pages = rendered_pages(tmp.path()).unwrap();
        let names: Vec<String> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page-01.png", "page-02.png", "page-10.png"]);
    }

    #[test]
    fn scratch_dirs_are_distinct_and_removed_on_drop() {
        let first = scratch_dir().unwrap();
        let second = scratch_dir().unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pdf_inbox_ocr_"));

        let kept = second.path().to_path_buf();
        std::fs::write(kept.join("page-1.png"), b"").unwrap();
        drop(first);
        assert!(kept.join("page-1.png").exists());
        drop(second);
        assert!(!kept.exists());
    }
}
