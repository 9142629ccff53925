//! Typed fragments of the generative API surface
//!
//! Payload pieces the dispatcher injects (safety settings, default
//! generation config), the structured error body it tries to parse out of
//! failed responses, and the realtime-input wrapper that carries one PCM16
//! frame to the live surface.
//!
//! This crate is a client of the API, not a protocol designer - only the
//! fragments the dispatch layer actually touches are modeled here.

use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base URL for the generative model surface. The full endpoint is
/// `{base}{model}{action}?key={credential}`.
pub const API_URL_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models/";

/// Mime type for raw PCM16 frames at the fixed live-call rate.
pub const PCM16_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// One harm-category threshold entry, as the API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

impl SafetySetting {
    fn blocked_at_medium(category: &str) -> Self {
        Self {
            category: category.to_string(),
            threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
        }
    }
}

static STANDARD_SAFETY_SETTINGS: Lazy<Vec<SafetySetting>> = Lazy::new(|| {
    vec![
        SafetySetting::blocked_at_medium("HARM_CATEGORY_HARASSMENT"),
        SafetySetting::blocked_at_medium("HARM_CATEGORY_HATE_SPEECH"),
        SafetySetting::blocked_at_medium("HARM_CATEGORY_SEXUALLY_EXPLICIT"),
        SafetySetting::blocked_at_medium("HARM_CATEGORY_DANGEROUS_CONTENT"),
    ]
});

static STANDARD_SAFETY_SETTINGS_VALUE: Lazy<Value> = Lazy::new(|| {
    serde_json::to_value(standard_safety_settings()).expect("static safety settings serialize")
});

static DEFAULT_GENERATION_CONFIG: Lazy<Value> =
    Lazy::new(|| serde_json::json!({ "temperature": 0.7 }));

/// The standard safety table applied to generation payloads that don't
/// carry their own.
pub fn standard_safety_settings() -> &'static [SafetySetting] {
    &STANDARD_SAFETY_SETTINGS
}

pub(crate) fn standard_safety_settings_value() -> &'static Value {
    &STANDARD_SAFETY_SETTINGS_VALUE
}

pub(crate) fn default_generation_config() -> &'static Value {
    &DEFAULT_GENERATION_CONFIG
}

/// Structured error body the API returns on failed requests:
/// `{ "error": { "message": "...", ... } }`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Pull a human-readable message out of a failed response body, falling
/// back to a synthesized one when the body is not the structured error
/// shape (HTML error pages, empty bodies, proxies).
pub(crate) fn error_message_from_body(status: u16, raw_body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(raw_body) {
        Ok(body) if !body.error.message.is_empty() => body.error.message,
        _ => format!("API request failed with status {}", status),
    }
}

// ============================================================================
// Realtime input (live-call audio frames)
// ============================================================================

/// Wrapper for one realtime PCM16 frame, as the live surface expects it.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeAudioInput {
    #[serde(rename = "realtimeInput")]
    pub realtime_input: RealtimeInputBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInputBody {
    #[serde(rename = "mediaChunks")]
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaChunk {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64 of the little-endian PCM16 bytes.
    pub data: String,
}

impl RealtimeAudioInput {
    /// Encode raw PCM16 samples into a realtime-input message.
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()).collect();
        Self {
            realtime_input: RealtimeInputBody {
                media_chunks: vec![MediaChunk {
                    mime_type: PCM16_MIME_TYPE.to_string(),
                    data: STANDARD.encode(&bytes),
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_safety_settings_cover_all_four_categories() {
        let settings = standard_safety_settings();
        assert_eq!(settings.len(), 4);
        for setting in settings {
            assert!(setting.category.starts_with("HARM_CATEGORY_"));
            assert_eq!(setting.threshold, "BLOCK_MEDIUM_AND_ABOVE");
        }
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let raw = r#"{"error": {"message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message_from_body(400, raw), "API key not valid");
    }

    #[test]
    fn error_message_synthesized_from_status_when_body_is_opaque() {
        assert_eq!(
            error_message_from_body(502, "<html>Bad Gateway</html>"),
            "API request failed with status 502"
        );
        assert_eq!(
            error_message_from_body(500, ""),
            "API request failed with status 500"
        );
    }

    #[test]
    fn realtime_audio_encoding_is_little_endian_base64() {
        let msg = RealtimeAudioInput::from_samples(&[0x1234, 0x5678]);
        let chunk = &msg.realtime_input.media_chunks[0];
        assert_eq!(chunk.mime_type, PCM16_MIME_TYPE);

        let decoded = STANDARD.decode(&chunk.data).unwrap();
        // 0x1234 -> [0x34, 0x12], 0x5678 -> [0x78, 0x56]
        assert_eq!(decoded, vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn realtime_audio_serializes_with_api_field_names() {
        let msg = RealtimeAudioInput::from_samples(&[0]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"realtimeInput\""));
        assert!(json.contains("\"mediaChunks\""));
        assert!(json.contains("\"mimeType\""));
    }
}
