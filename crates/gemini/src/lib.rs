// gemini - client for the Gemini image generation API
// One image and one prompt go in, one PNG comes out. Everything else
// (input capture, validation, lifecycle) lives in the application layer.

mod client;
pub mod error;

pub use client::GeminiClient;
pub use error::{GeminiError, Result};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Media types accepted as generation input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
    WebP,
}

impl MediaType {
    /// Returns the MIME string sent on the wire
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Returns the usual file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Detect the media type from content signatures. Returns `None` for
    /// anything that is not PNG, JPEG or WebP.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }
        None
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}

/// A single generation request: one source image plus one prompt.
/// Constructed immediately before dispatch and discarded after the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Base64-encoded source image bytes
    pub image_base64: String,
    /// Media type of the source image
    pub media_type: MediaType,
    /// Non-empty instruction for the model
    pub prompt: String,
}

/// The image returned by the generation API. Always PNG, regardless of the
/// input media type.
#[derive(Debug, Clone)]
pub struct GeneratedPng {
    bytes: Vec<u8>,
}

impl GeneratedPng {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Re-encode as base64 text
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Render as a data URL for inline display surfaces
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }

    /// Write the PNG bytes to disk
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

/// Boundary trait for the external generation collaborator.
///
/// No retry and no timeout: the call either resolves or the caller waits.
/// Implementations must return PNG on success and an error whose `Display`
/// is the human-readable message to surface.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPng>;
}
