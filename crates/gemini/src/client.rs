//! HTTP client for the Gemini `generateContent` image endpoint

use crate::error::{GeminiError, Result};
use crate::{GeneratedPng, GenerationRequest, GenerationService};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Gemini API client
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a client with an explicit API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client from the `GEMINI_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        std::env::var("GEMINI_API_KEY")
            .map(Self::new)
            .map_err(|_| GeminiError::MissingApiKey)
    }

    /// Override the model identifier
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Get the model identifier
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate_content(&self, request: &GenerationRequest) -> Result<GeneratedPng> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = WireRequest::from_request(request);

        tracing::debug!(
            model = %self.model,
            media_type = %request.media_type,
            prompt_len = request.prompt.len(),
            "dispatching generation request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "generation request rejected");
            return Err(error_from_status(status.as_u16(), &text));
        }

        let wire: WireResponse = response.json().await?;
        extract_png(wire)
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPng> {
        self.generate_content(request).await
    }
}

/// Map a non-2xx status to an error, pulling the server's `error.message`
/// out of the body when it parses.
fn error_from_status(status: u16, body: &str) -> GeminiError {
    let message = serde_json::from_str::<WireError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        401 | 403 => GeminiError::Auth(message),
        429 => GeminiError::RateLimited,
        _ => GeminiError::Api { status, message },
    }
}

/// Pull the PNG out of a 200 response. Safety blocks come back as HTTP 200
/// with a block reason, so they are checked here rather than by status.
fn extract_png(wire: WireResponse) -> Result<GeneratedPng> {
    if let Some(feedback) = wire.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            let message = feedback
                .block_reason_message
                .unwrap_or_else(|| format!("prompt blocked ({reason})"));
            return Err(GeminiError::Blocked(message));
        }
    }

    let candidate = wire
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GeminiError::UnexpectedResponse("no candidates in response".into()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if is_safety_stop(reason) {
            return Err(GeminiError::Blocked(format!(
                "generation stopped by safety filter ({reason})"
            )));
        }
    }

    let inline = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .find_map(|p| p.inline_data)
        .ok_or_else(|| GeminiError::UnexpectedResponse("no image data in response".into()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| GeminiError::Decode(e.to_string()))?;

    Ok(GeneratedPng::new(bytes))
}

fn is_safety_stop(reason: &str) -> bool {
    matches!(
        reason,
        "SAFETY"
            | "IMAGE_SAFETY"
            | "RECITATION"
            | "IMAGE_RECITATION"
            | "PROHIBITED_CONTENT"
            | "IMAGE_PROHIBITED_CONTENT"
            | "BLOCKLIST"
    )
}

// Wire envelope

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    generation_config: WireGenerationConfig,
}

#[derive(Serialize)]
struct WireContent {
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
enum WirePart {
    Inline { inline_data: WireInlineData },
    Text { text: String },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    response_modalities: Vec<String>,
}

impl WireRequest {
    fn from_request(request: &GenerationRequest) -> Self {
        // Source image first, then the instruction text
        let parts = vec![
            WirePart::Inline {
                inline_data: WireInlineData {
                    mime_type: request.media_type.mime_type().to_string(),
                    data: request.image_base64.clone(),
                },
            },
            WirePart::Text {
                text: request.prompt.clone(),
            },
        ];

        Self {
            contents: vec![WireContent { parts }],
            generation_config: WireGenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<WirePromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireCandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponsePart {
    #[serde(default)]
    inline_data: Option<WireInlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaType;

    fn request() -> GenerationRequest {
        GenerationRequest {
            image_base64: "AQIDBA==".to_string(),
            media_type: MediaType::Jpeg,
            prompt: "Add a retro filter".to_string(),
        }
    }

    #[test]
    fn test_wire_request_shape() {
        let wire = WireRequest::from_request(&request());
        let json = serde_json::to_value(&wire).unwrap();

        assert!(json.get("generationConfig").is_some());
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "AQIDBA==");
        assert_eq!(parts[1]["text"], "Add a retro filter");
    }

    #[test]
    fn test_extract_png_success() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": { "mimeType": "image/png", "data": "AQIDBA==" }
                    }]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        let image = extract_png(wire).unwrap();
        assert_eq!(image.bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_extract_png_skips_text_only_parts() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": "AQIDBA==" } }
                    ]
                }
            }]
        }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        assert!(extract_png(wire).is_ok());
    }

    #[test]
    fn test_extract_png_no_candidates() {
        let wire: WireResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            extract_png(wire),
            Err(GeminiError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_extract_png_no_image_part() {
        let json = r#"{ "candidates": [{ "content": { "parts": [{ "text": "sorry" }] } }] }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            extract_png(wire),
            Err(GeminiError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_extract_png_prompt_feedback_block() {
        let json = r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked"
            }
        }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        match extract_png(wire) {
            Err(GeminiError::Blocked(message)) => assert_eq!(message, "Prompt was blocked"),
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_png_safety_finish_reason() {
        let json = r#"{ "candidates": [{ "finishReason": "IMAGE_SAFETY" }] }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(extract_png(wire), Err(GeminiError::Blocked(_))));
    }

    #[test]
    fn test_extract_png_invalid_base64() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [{ "inlineData": { "mimeType": "image/png", "data": "!!!" } }]
                }
            }]
        }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(extract_png(wire), Err(GeminiError::Decode(_))));
    }

    #[test]
    fn test_error_from_status_auth() {
        let body = r#"{ "error": { "message": "API key not valid", "status": "PERMISSION_DENIED" } }"#;
        match error_from_status(403, body) {
            GeminiError::Auth(message) => assert_eq!(message, "API key not valid"),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn test_error_from_status_rate_limited() {
        assert!(matches!(
            error_from_status(429, "{}"),
            GeminiError::RateLimited
        ));
    }

    #[test]
    fn test_error_from_status_server_message_verbatim() {
        let body = r#"{ "error": { "message": "Quota exceeded for this project" } }"#;
        let err = error_from_status(500, body);
        assert_eq!(err.to_string(), "Quota exceeded for this project");
    }

    #[test]
    fn test_error_from_status_unparseable_body() {
        let err = error_from_status(502, "Bad Gateway\n");
        match err {
            GeminiError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn test_error_from_status_empty_body_renders_blank() {
        // The session layer substitutes its generic unknown-error message
        // whenever an error renders to a blank string.
        let err = error_from_status(500, "");
        assert_eq!(err.to_string(), "");
    }

    #[test]
    fn test_client_builder_overrides() {
        let client = GeminiClient::new("key")
            .with_model("gemini-test-model")
            .with_base_url("http://localhost:9999");
        assert_eq!(client.model(), "gemini-test-model");
        assert_eq!(client.base_url, "http://localhost:9999");
    }
}
