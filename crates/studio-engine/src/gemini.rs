use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use studio_contracts::image::{EncodedImage, DEFAULT_MIME_TYPE};

use crate::client::{EditClient, RemoteError};
use crate::config::StudioConfig;

const PROVIDER: &str = "Gemini";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// `generateContent` client for Gemini image models.
///
/// One POST per edit. No retries; the only timeout is the optional one from
/// [`StudioConfig::request_timeout`].
pub struct GeminiEditClient {
    api_base: String,
    model: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiEditClient {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            model: config.image_model.clone(),
            api_key: config.api_key.clone(),
            http: build_http_client(config.request_timeout),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl EditClient for GeminiEditClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn edit(&self, source: &EncodedImage, prompt: &str) -> Result<EncodedImage, RemoteError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(RemoteError::MissingCredential {
                provider: PROVIDER,
                hint: "GEMINI_API_KEY, GOOGLE_API_KEY or API_KEY",
            });
        };
        let endpoint = self.endpoint();
        let payload = build_edit_payload(source, prompt);
        log::debug!("POST {endpoint} ({} base64 chars)", source.payload().len());

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .map_err(|err| RemoteError::Transport {
                provider: PROVIDER,
                // The query string carries the key; keep it out of messages.
                message: err.without_url().to_string(),
            })?;

        let status = response.status();
        let body = response.text().map_err(|err| RemoteError::Transport {
            provider: PROVIDER,
            message: format!("response body read failed: {}", err.without_url()),
        })?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
            });
        }

        let parsed: Value =
            serde_json::from_str(&body).map_err(|err| RemoteError::InvalidResponse {
                provider: PROVIDER,
                message: err.to_string(),
            })?;
        extract_edited_image(&parsed)
    }
}

fn build_http_client(timeout: Option<Duration>) -> HttpClient {
    // The blocking client defaults to a 30s timeout; calls here are unbounded
    // unless one is configured.
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            log::warn!("custom HTTP client unavailable ({err}); using defaults");
            HttpClient::new()
        })
}

/// Request body: the prompt followed by the source photo, always declared
/// as PNG.
pub(crate) fn build_edit_payload(source: &EncodedImage, prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                {
                    "inlineData": {
                        "data": source.payload(),
                        "mimeType": DEFAULT_MIME_TYPE,
                    }
                }
            ]
        }]
    })
}

/// Pulls the first inline image out of `candidates[0].content.parts`.
pub(crate) fn extract_edited_image(response: &Value) -> Result<EncodedImage, RemoteError> {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .ok_or(RemoteError::NoContent)?;

    for part in parts {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MIME_TYPE);
        return Ok(EncodedImage::from_base64(mime_type, data));
    }

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty());
    match text {
        Some(text) => Err(RemoteError::TextInsteadOfImage(text.to_string())),
        None => Err(RemoteError::NoImageData),
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
