//! Image generation providers.
//!
//! A provider takes the uploaded clothing photo plus the assembled prompt
//! and returns raw image bytes. Providers sit behind one trait and are
//! tried in order by [`ProviderChain`]; the last error is surfaced when the
//! whole chain fails.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

pub mod claude;
pub mod gemini;

pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;

/// Payloads above this size get downscaled before being sent to a vendor.
const DOWNSCALE_THRESHOLD_BYTES: usize = 500 * 1024;
/// Longest edge after downscaling.
const DOWNSCALE_MAX_DIMENSION: u32 = 800;
const DOWNSCALE_JPEG_QUALITY: u8 = 85;

/// Uploaded image bytes plus their mime type.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl ImagePayload {
    /// Infer the mime type from the stored file name. Uploads are
    /// constrained to JPEG and PNG, so anything not `.png` is JPEG.
    pub fn from_path_hint(path: &str, bytes: Vec<u8>) -> Self {
        let mime_type = if path.to_ascii_lowercase().ends_with(".png") {
            "image/png"
        } else {
            "image/jpeg"
        };
        Self { bytes, mime_type }
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider name for logging/identification
    fn name(&self) -> &'static str;

    /// Generate an image of a model wearing the clothing in `image`.
    /// Returns the raw bytes of the generated image.
    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<Vec<u8>>;
}

/// Ordered list of providers, tried front to back. A single-shot fallback:
/// each provider gets exactly one attempt per generation.
pub struct ProviderChain {
    providers: Vec<Box<dyn ImageProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn ImageProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<Vec<u8>> {
        let mut last_err = anyhow!("no image generation provider configured");

        for provider in &self.providers {
            info!("Generating via {}", provider.name());
            match provider.generate(image, prompt).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    warn!("{} failed: {:#}", provider.name(), err);
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

static DATA_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/(jpeg|png);base64,([A-Za-z0-9+/=]+)").expect("valid regex")
});

/// Scan free text for an embedded `data:image/...;base64,` URI and decode
/// its payload. Vendors sometimes answer with the image inlined in a text
/// part instead of a structured binary part.
pub fn image_from_data_uri(text: &str) -> Option<Vec<u8>> {
    let caps = DATA_URI_RE.captures(text)?;
    BASE64.decode(caps.get(2)?.as_str()).ok()
}

pub fn decode_base64_image(data: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(data.trim())
        .map_err(|e| anyhow!("invalid base64 image payload: {e}"))
}

/// Downscale oversized uploads before submission; vendor accept limits and
/// latency both favor small inputs. Falls back to the original bytes if the
/// image can't be decoded.
pub fn prepare_for_upload(payload: &ImagePayload) -> ImagePayload {
    if payload.bytes.len() <= DOWNSCALE_THRESHOLD_BYTES {
        return payload.clone();
    }

    match downscale(&payload.bytes) {
        Ok(jpeg) => {
            info!(
                "Downscaled payload {} -> {} bytes",
                payload.bytes.len(),
                jpeg.len()
            );
            ImagePayload {
                bytes: jpeg,
                mime_type: "image/jpeg",
            }
        }
        Err(err) => {
            warn!("Could not downscale image, sending original: {err}");
            payload.clone()
        }
    }
}

fn downscale(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let resized = img.thumbnail(DOWNSCALE_MAX_DIMENSION, DOWNSCALE_MAX_DIMENSION);

    let mut out = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, DOWNSCALE_JPEG_QUALITY);
    resized.to_rgb8().write_with_encoder(encoder)?;
    Ok(out)
}
