//! Gemini image generation provider.
//!
//! Calls the generateContent API with the clothing photo inline and asks for
//! an IMAGE response modality. Response parts are decoded into an explicit
//! shape: either structured inline bytes or text that may embed a data URI.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ImagePayload, ImageProvider, decode_base64_image, image_from_data_uri};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
/// Image generation routinely takes minutes, not seconds.
const REQUEST_TIMEOUT_SECS: u64 = 5 * 60;

/// Sampling parameters for the image generation model.
#[derive(Debug, Clone, Copy)]
pub struct ModelConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

pub const IMAGE_MODEL_CONFIG: ModelConfig = ModelConfig {
    temperature: 0.4,
    top_p: 0.95,
    top_k: 32,
    max_output_tokens: 4096,
};

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    config: ModelConfig,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config: IMAGE_MODEL_CONFIG,
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiRequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    parts: Option<Vec<GeminiResponsePart>>,
}

/// A response part is either inline image bytes or text. Anything else the
/// API grows in the future lands in `Other` and is ignored.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
enum GeminiResponsePart {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Text {
        text: String,
    },
    Other(serde_json::Value),
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}

/// Pull image bytes out of the response parts: a structured inline part
/// wins, then any text part is scanned for an embedded data URI.
fn extract_image(parts: &[GeminiResponsePart]) -> Result<Vec<u8>> {
    for part in parts {
        if let GeminiResponsePart::Inline { inline_data } = part {
            return decode_base64_image(&inline_data.data);
        }
    }

    for part in parts {
        if let GeminiResponsePart::Text { text } = part {
            if let Some(bytes) = image_from_data_uri(text) {
                return Ok(bytes);
            }
        }
    }

    anyhow::bail!("no image data in response")
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<Vec<u8>> {
        let api_request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![
                    GeminiRequestPart::Text {
                        text: prompt.to_string(),
                    },
                    GeminiRequestPart::Inline {
                        inline_data: GeminiInlineData {
                            mime_type: image.mime_type.to_string(),
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, GEMINI_IMAGE_MODEL, self.api_key
        );

        debug!(
            "Sending generation request to Gemini ({} byte image)",
            image.bytes.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&api_request)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error: {} - {}", status, body);
        }

        let api_response: GeminiResponse = response.json().await?;

        if let Some(error) = api_response.error {
            anyhow::bail!("Gemini error: {}", error.message);
        }

        let parts = api_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .unwrap_or_default();

        extract_image(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn parse_parts(json: &str) -> Vec<GeminiResponsePart> {
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .unwrap_or_default()
    }

    #[test]
    fn test_extract_inline_part() {
        let encoded = BASE64.encode(b"generated-png");
        let json = format!(
            r#"{{"candidates":[{{"content":{{"parts":[
                {{"text":"Here is your image"}},
                {{"inlineData":{{"mimeType":"image/png","data":"{encoded}"}}}}
            ]}}}}]}}"#
        );

        let bytes = extract_image(&parse_parts(&json)).unwrap();
        assert_eq!(bytes, b"generated-png");
    }

    #[test]
    fn test_extract_data_uri_from_text() {
        let encoded = BASE64.encode(b"generated-jpeg");
        let json = format!(
            r#"{{"candidates":[{{"content":{{"parts":[
                {{"text":"data:image/jpeg;base64,{encoded}"}}
            ]}}}}]}}"#
        );

        let bytes = extract_image(&parse_parts(&json)).unwrap();
        assert_eq!(bytes, b"generated-jpeg");
    }

    #[test]
    fn test_extract_fails_without_image() {
        let json = r#"{"candidates":[{"content":{"parts":[
            {"text":"I cannot generate that image."}
        ]}}]}"#;

        let err = extract_image(&parse_parts(json)).unwrap_err();
        assert_eq!(err.to_string(), "no image data in response");
    }

    #[test]
    fn test_extract_fails_on_empty_candidates() {
        let err = extract_image(&parse_parts(r#"{"candidates":[]}"#)).unwrap_err();
        assert_eq!(err.to_string(), "no image data in response");
    }

    #[test]
    fn test_unknown_parts_are_tolerated() {
        let json = r#"{"candidates":[{"content":{"parts":[
            {"functionCall":{"name":"noop","args":{}}}
        ]}}]}"#;

        let parts = parse_parts(json);
        assert!(matches!(parts[0], GeminiResponsePart::Other(_)));
    }

    #[test]
    fn test_request_wire_shape() {
        let payload = ImagePayload::from_path_hint("original/a.jpg", b"img".to_vec());
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![
                    GeminiRequestPart::Text {
                        text: "prompt".to_string(),
                    },
                    GeminiRequestPart::Inline {
                        inline_data: GeminiInlineData {
                            mime_type: payload.mime_type.to_string(),
                            data: payload.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: IMAGE_MODEL_CONFIG.temperature,
                top_p: IMAGE_MODEL_CONFIG.top_p,
                top_k: IMAGE_MODEL_CONFIG.top_k,
                max_output_tokens: IMAGE_MODEL_CONFIG.max_output_tokens,
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(json["generationConfig"]["topK"], 32);
        assert_eq!(
            json["generationConfig"]["responseModalities"][1],
            "IMAGE"
        );
    }
}
