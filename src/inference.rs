//! Inference client abstraction and the Ollama chat implementation.
//!
//! Every call is one non-streaming request/response exchange against
//! `POST {host}/api/chat`. There is no retry: a failed call surfaces as an
//! [`InferenceError`] so the caller can refuse to log a lost result.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::{InferenceConfig, PipelineConfig};
use crate::extract::truncate_chars;
use crate::models::{ImageContent, ImageUnit};
use crate::prompts;

/// Failure of a single inference call.
#[derive(Debug)]
pub enum InferenceError {
    /// The request never produced an HTTP response.
    Unreachable(String),
    /// The service answered with a non-success status.
    Status { status: u16, body: String },
    /// The response body was not the expected chat message.
    Malformed(String),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::Unreachable(e) => write!(f, "inference service unreachable: {}", e),
            InferenceError::Status { status, body } => {
                write!(f, "inference service returned {}: {}", status, body)
            }
            InferenceError::Malformed(e) => write!(f, "malformed inference response: {}", e),
        }
    }
}

impl std::error::Error for InferenceError {}

/// Turns one content unit into text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Captions one image. The placeholder unit still costs exactly one call.
    async fn describe_image(&self, unit: &ImageUnit) -> Result<String, InferenceError>;

    /// Extracts dated tasks from document text.
    async fn extract_tasks(&self, text: &str) -> Result<String, InferenceError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: content.to_string(),
            images: Vec::new(),
        }
    }

    fn user(content: String) -> Self {
        Self {
            role: "user",
            content,
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Client for an Ollama-compatible chat API.
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
    max_prompt_chars: usize,
    target_language: String,
}

impl OllamaClient {
    pub fn new(inference: &InferenceConfig, pipeline: &PipelineConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = inference.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .context("Failed to build inference HTTP client")?;

        Ok(Self {
            client,
            host: inference.host.trim_end_matches('/').to_string(),
            model: inference.model.clone(),
            max_prompt_chars: pipeline.max_prompt_chars,
            target_language: pipeline.target_language.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models installed on the inference host.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.host);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach inference host {}", self.host))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Listing models failed with status {}: {}", status, body);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse model list")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, InferenceError> {
        let url = format!("{}/api/chat", self.host);
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        debug!(url = %url, model = %self.model, "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_chat_response(&body)
    }

    fn task_messages(&self, text: &str) -> Vec<ChatMessage> {
        let bounded = truncate_chars(text, self.max_prompt_chars);
        vec![ChatMessage::user(prompts::task_prompt(
            bounded,
            &self.target_language,
        ))]
    }
}

fn image_messages(unit: &ImageUnit) -> Vec<ChatMessage> {
    let user = match &unit.content {
        ImageContent::Encoded { bytes, .. } => {
            let mut message = ChatMessage::user(prompts::IMAGE_INSTRUCTION.to_string());
            message
                .images
                .push(base64::engine::general_purpose::STANDARD.encode(bytes));
            message
        }
        ImageContent::NotFound => ChatMessage::user(format!(
            "{}\n\n{}",
            prompts::IMAGE_INSTRUCTION,
            prompts::NO_IMAGES_SENTINEL
        )),
    };
    vec![ChatMessage::system(prompts::IMAGE_SYSTEM), user]
}

/// Extracts the trimmed assistant message from a `/api/chat` response body.
fn parse_chat_response(body: &str) -> Result<String, InferenceError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::Malformed(e.to_string()))?;
    Ok(parsed.message.content.trim().to_string())
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn describe_image(&self, unit: &ImageUnit) -> Result<String, InferenceError> {
        self.chat(image_messages(unit)).await
    }

    async fn extract_tasks(&self, text: &str) -> Result<String, InferenceError> {
        self.chat(self.task_messages(text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageFormat;

    fn client(max_prompt_chars: usize) -> OllamaClient {
        let inference = InferenceConfig {
            host: "http://localhost:11434/".to_string(),
            model: "llava:7b".to_string(),
            timeout_secs: None,
        };
        let pipeline = PipelineConfig {
            max_prompt_chars,
            ..PipelineConfig::default()
        };
        OllamaClient::new(&inference, &pipeline).unwrap()
    }

    #[test]
    fn host_trailing_slash_is_trimmed() {
        assert_eq!(client(10).host, "http://localhost:11434");
    }

    #[test]
    fn parse_trims_message_content() {
        let body = r#"{"model":"gemma3:1b","message":{"role":"assistant","content":"\n 2024-03-15, Zaplatit fakturu \n"},"done":true}"#;
        assert_eq!(
            parse_chat_response(body).unwrap(),
            "2024-03-15, Zaplatit fakturu"
        );
    }

    #[test]
    fn parse_rejects_missing_message() {
        let err = parse_chat_response(r#"{"error":"model not found"}"#).unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));
        let err = parse_chat_response("<html>").unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));
    }

    #[test]
    fn task_request_truncates_document_text() {
        let c = client(5);
        let messages = c.task_messages("abcdefghij");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.ends_with("abcde\n"));
        assert!(!messages[0].content.contains("abcdef"));
    }

    #[test]
    fn image_request_carries_base64_payload() {
        let unit = ImageUnit {
            document: "scan.pdf".to_string(),
            page_number: 1,
            image_index: 1,
            content: ImageContent::Encoded {
                bytes: vec![1, 2, 3],
                format: ImageFormat::Png,
            },
        };
        let messages = image_messages(&unit);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].images, vec!["AQID".to_string()]);

        let request = ChatRequest {
            model: "llava:7b",
            messages,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert!(json["messages"][0].get("images").is_none());
        assert_eq!(json["messages"][1]["images"][0], "AQID");
    }

    #[test]
    fn placeholder_request_has_sentinel_and_no_image() {
        let messages = image_messages(&ImageUnit::placeholder("empty.pdf"));
        assert!(messages[1].images.is_empty());
        assert!(messages[1].content.ends_with(prompts::NO_IMAGES_SENTINEL));
    }
}
