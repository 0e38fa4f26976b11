//! Claude fallback provider.
//!
//! Second entry in the provider chain. The request carries the clothing
//! photo as a base64 image block; the reply is scanned for an image content
//! block first, then for a data URI embedded in text blocks.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ImagePayload, ImageProvider, decode_base64_image, image_from_data_uri};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLAUDE_MODEL: &str = "claude-3-7-sonnet-20250219";
const MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECS: u64 = 5 * 60;

const SYSTEM_PROMPT: &str = "You are a fashion imaging specialist. Your task is to produce a single \
complete, high-quality, realistic image of a model wearing the provided clothing item. This is a \
virtual try-on service.";

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicRequestBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum AnthropicRequestBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicResponseBlock>>,
    error: Option<AnthropicError>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
enum AnthropicResponseBlock {
    Image {
        source: AnthropicResponseImageSource,
    },
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct AnthropicResponseImageSource {
    data: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    message: String,
}

fn extract_image(blocks: &[AnthropicResponseBlock]) -> Result<Vec<u8>> {
    for block in blocks {
        if let AnthropicResponseBlock::Image { source } = block {
            if let Some(data) = &source.data {
                return decode_base64_image(data);
            }
        }
    }

    for block in blocks {
        if let AnthropicResponseBlock::Text { text } = block {
            if let Some(bytes) = image_from_data_uri(text) {
                return Ok(bytes);
            }
        }
    }

    anyhow::bail!("no image data in response")
}

#[async_trait]
impl ImageProvider for ClaudeProvider {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<Vec<u8>> {
        let api_request = AnthropicRequest {
            model: CLAUDE_MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![
                    AnthropicRequestBlock::Text {
                        text: prompt.to_string(),
                    },
                    AnthropicRequestBlock::Image {
                        source: AnthropicImageSource {
                            source_type: "base64".to_string(),
                            media_type: image.mime_type.to_string(),
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
        };

        debug!(
            "Sending generation request to Claude ({} byte image)",
            image.bytes.len()
        );

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&api_request)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error: {} - {}", status, body);
        }

        let api_response: AnthropicResponse = response.json().await?;

        if let Some(error) = api_response.error {
            anyhow::bail!("Anthropic error: {}", error.message);
        }

        extract_image(&api_response.content.unwrap_or_default())
    }
}
