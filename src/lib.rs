//! # PDF Inbox
//!
//! Watches a directory for new PDF files, turns each one into text with a
//! local Ollama model, and appends the answers to a CSV log.
//!
//! Two pipelines share one controller:
//!
//! - **tasks**: the text layer (or OCR of the rendered pages when there is no
//!   text layer) goes to the model with a prompt asking for dated tasks.
//! - **images**: every embedded image is re-encoded as PNG and captioned.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌───────────┐
//! │ Watcher  │──▶│ Controller │──▶│ Extractor │──▶│ Inference │
//! │ (notify) │   │  (dedup)   │   │ text/img  │   │ (Ollama)  │
//! └──────────┘   └─────┬──────┘   └───────────┘   └─────┬─────┘
//!                      │                                │
//!                      ▼                                │
//!                ┌────────────┐   all rows or none      │
//!                │ CSV log    │◀────────────────────────┘
//!                └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! inbox watch                          # run until Ctrl-C
//! inbox --pipeline images watch        # caption images instead
//! inbox process ./inbox/invoice.pdf    # one-shot
//! inbox models                         # list models on the host
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`watch`] | Directory watcher |
//! | [`ingest`] | Per-document controller |
//! | [`extract`] | Text-layer extraction with OCR fallback |
//! | [`ocr`] | OCR through `pdftoppm` and `tesseract` |
//! | [`images`] | Embedded image extraction |
//! | [`inference`] | Inference client abstraction and Ollama client |
//! | [`prompts`] | Prompt templates |
//! | [`tasks`] | Task-line format check |
//! | [`result_log`] | Append-only CSV log and dedup lookup |

pub mod config;
pub mod extract;
pub mod images;
pub mod inference;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod prompts;
pub mod result_log;
pub mod tasks;
pub mod watch;
