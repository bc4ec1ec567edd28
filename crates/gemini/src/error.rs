//! Error types for the Gemini image client

use thiserror::Error;

/// Result type for generation calls
pub type Result<T> = std::result::Result<T, GeminiError>;

/// Errors raised by the generation boundary.
///
/// `Display` output is shown to the user as-is, so API errors render the
/// server's message verbatim; callers treat a blank message as unknown.
#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by the API, try again later")]
    RateLimited,

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Content blocked: {0}")]
    Blocked(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Could not decode image payload: {0}")]
    Decode(String),
}
