use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::PipelineKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub watch: WatchConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Delay before a created file is processed, giving the writer time to finish.
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
    /// Enqueue documents already present in `dir` at startup.
    #[serde(default)]
    pub scan_existing: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.pdf".to_string()]
}
fn default_settle_millis() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default)]
    pub kind: PipelineKind,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kind: PipelineKind::default(),
            max_prompt_chars: default_max_prompt_chars(),
            target_language: default_target_language(),
        }
    }
}

fn default_max_prompt_chars() -> usize {
    10_000
}
fn default_target_language() -> String {
    "Czech".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub model: String,
    /// Request timeout. Unset means the call waits for as long as the service takes.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ocr_language")]
    pub language: String,
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: default_ocr_enabled(),
            language: default_ocr_language(),
            dpi: default_ocr_dpi(),
        }
    }
}

fn default_ocr_enabled() -> bool {
    true
}
fn default_ocr_language() -> String {
    "eng".to_string()
}
fn default_ocr_dpi() -> u32 {
    300
}

impl WatchConfig {
    /// Compiles `include_globs` into a matcher applied to base filenames.
    pub fn include_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.include_globs {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid watch.include_globs pattern: {}", pattern))?;
            builder.add(glob);
        }
        Ok(builder.build()?)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.inference.model.trim().is_empty() {
        anyhow::bail!("inference.model must not be empty");
    }

    if !(config.inference.host.starts_with("http://")
        || config.inference.host.starts_with("https://"))
    {
        anyhow::bail!(
            "inference.host must be an http(s) URL, got '{}'",
            config.inference.host
        );
    }

    if config.inference.timeout_secs == Some(0) {
        anyhow::bail!("inference.timeout_secs must be > 0 when set");
    }

    if config.pipeline.max_prompt_chars == 0 {
        anyhow::bail!("pipeline.max_prompt_chars must be > 0");
    }

    if config.ocr.dpi == 0 {
        anyhow::bail!("ocr.dpi must be > 0");
    }

    if config.watch.include_globs.is_empty() {
        anyhow::bail!("watch.include_globs must contain at least one pattern");
    }
    config.watch.include_set()?;

    Ok(config)
}
