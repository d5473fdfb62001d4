use serde::{Deserialize, Serialize};

/// Error body returned by the backend. Different routes use either `error`
/// or `message` for the human-readable text.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            message: None,
        }
    }

    /// Pull the user-facing text out of a raw response body, if any.
    pub fn text_from(body: &[u8]) -> Option<String> {
        let parsed: ErrorResponse = serde_json::from_slice(body).ok()?;
        parsed
            .error
            .or(parsed.message)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
