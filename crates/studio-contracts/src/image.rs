use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// Base64 image payload plus its declared MIME type.
///
/// Uploaded photos arrive as data URIs (`data:image/<fmt>;base64,<payload>`);
/// remote responses arrive as bare base64 with a separate MIME field. Both
/// normalize to this shape so the prefix never leaks into a request body.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    mime_type: String,
    data: String,
}

impl EncodedImage {
    pub fn from_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        Self {
            mime_type: if mime_type.trim().is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                mime_type.trim().to_ascii_lowercase()
            },
            data: data.into().trim().to_string(),
        }
    }

    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::from_base64(mime_type, BASE64.encode(bytes))
    }

    /// Accepts a data URI or bare base64. Anything without a
    /// `data:<mime>;base64,` header is treated as a PNG payload.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some((mime_type, payload)) = split_data_uri(trimmed) {
            return Self::from_base64(mime_type, payload);
        }
        Self::from_base64(DEFAULT_MIME_TYPE, trimmed)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Raw base64 without any data-URI prefix.
    pub fn payload(&self) -> &str {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(self.data.as_bytes())
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

// Payloads are megabytes of base64; keep debug output readable.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

fn split_data_uri(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    if !mime_type.starts_with("image/") {
        return None;
    }
    Some((mime_type, payload))
}
