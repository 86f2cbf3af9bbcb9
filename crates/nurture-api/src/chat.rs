//! Chatbot text generation.
//!
//! The `/chat` handler depends only on [`TextGenerator`]; [`GeminiClient`]
//! is the production implementation backed by the Generative Language
//! `generateContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use nurture_core::config::ChatConfig;
use nurture_core::error::NurtureError;

/// Longest prompt accepted by `/chat`, in characters.
pub const MAX_PROMPT_CHARS: usize = 4000;

const MAX_ATTEMPTS: u32 = 3;

/// Produces a reply for a user prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, NurtureError>;
}

/// Client for Gemini `generateContent`.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &ChatConfig) -> Result<Self, NurtureError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NurtureError::Chat(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, NurtureError> {
        let body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let res = self
                .client
                .post(self.url())
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await;

            match res {
                Ok(r) => {
                    let status = r.status();
                    let text = r.text().await.map_err(|e| NurtureError::Chat(e.to_string()))?;
                    if status.is_success() {
                        return decode_reply(&text);
                    }
                    // Client errors will not succeed on retry.
                    if status.is_client_error() && status.as_u16() != 429 {
                        return Err(NurtureError::Chat(format!("Gemini API error: {}", status)));
                    }
                    last_err = Some(format!("Gemini API error: {}", status));
                }
                Err(e) => last_err = Some(e.to_string()),
            }

            if attempt < MAX_ATTEMPTS {
                let backoff_ms = 100u64 * 2u64.pow(attempt);
                tracing::debug!(attempt, backoff_ms, "Retrying Gemini request");
                sleep(Duration::from_millis(backoff_ms)).await;
            }
        }

        Err(NurtureError::Chat(
            last_err.unwrap_or_else(|| "Unknown Gemini error".to_string()),
        ))
    }
}

/// Turn a successful response body into the reply text. A body that is
/// not JSON or carries no text is a provider failure.
fn decode_reply(body: &str) -> Result<String, NurtureError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| NurtureError::Chat(format!("Malformed Gemini response: {}", e)))?;
    parse_gemini_response(&json)
        .ok_or_else(|| NurtureError::Chat("Gemini response contained no text".to_string()))
}

/// Concatenate `candidates[0].content.parts[*].text`.
pub fn parse_gemini_response(json: &serde_json::Value) -> Option<String> {
    let parts = json.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Trim and bound a prompt.
pub fn validate_prompt(prompt: &str) -> Result<&str, NurtureError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(NurtureError::Validation("Prompt must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_PROMPT_CHARS {
        return Err(NurtureError::Validation(format!(
            "Prompt must be at most {} characters",
            MAX_PROMPT_CHARS
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concatenates_parts() {
        let json = serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": "Hello" }, { "text": ", world" } ] } },
                { "content": { "parts": [ { "text": "ignored" } ] } }
            ]
        });
        assert_eq!(parse_gemini_response(&json).as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_parse_missing_candidates() {
        assert_eq!(parse_gemini_response(&serde_json::json!({})), None);
        let blocked = serde_json::json!({ "candidates": [ { "finishReason": "SAFETY" } ] });
        assert_eq!(parse_gemini_response(&blocked), None);
    }

    #[test]
    fn test_decode_reply_failures_are_provider_errors() {
        let ok = r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]}"#;
        assert_eq!(decode_reply(ok).unwrap(), "Hi");

        let err = decode_reply("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, NurtureError::Chat(_)));
        let status = crate::error::ApiError::from(err).status();
        assert_eq!(status, axum::http::StatusCode::BAD_GATEWAY);

        assert!(matches!(decode_reply("{}").unwrap_err(), NurtureError::Chat(_)));
    }

    #[test]
    fn test_validate_prompt() {
        assert!(validate_prompt("   ").is_err());
        assert_eq!(validate_prompt("  hi  ").unwrap(), "hi");
        assert!(validate_prompt(&"x".repeat(MAX_PROMPT_CHARS)).is_ok());
        assert!(validate_prompt(&"x".repeat(MAX_PROMPT_CHARS + 1)).is_err());
    }

    #[test]
    fn test_client_url() {
        let config = ChatConfig {
            api_key: "k".to_string(),
            ..ChatConfig::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(
            client.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
