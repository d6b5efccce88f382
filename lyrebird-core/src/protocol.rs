//! Wire format for the synthesis service
//!
//! Both transports speak JSON. The chunked HTTP endpoint streams
//! newline-delimited records; the bidirectional socket carries one JSON
//! object per text message, tagged with the context it belongs to.

use serde::{Deserialize, Serialize};

use crate::config::SynthesisConfig;

/// Character count after which the service should stop buffering a context's
/// pending text and start synthesizing.
pub const BUFFER_CHAR_THRESHOLD: u32 = 32;

/// Upper bound on how long the service may buffer pending text, in ms.
pub const MAX_BUFFER_DELAY_MS: u32 = 200;

/// Audio sub-object shared by both transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub audio_encoding: crate::config::AudioEncoding,
    pub bitrate: u32,
    pub sample_rate_hertz: u32,
    pub speaking_rate: f64,
}

impl AudioConfig {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            audio_encoding: config.encoding,
            bitrate: config.bitrate,
            sample_rate_hertz: config.sample_rate,
            speaking_rate: config.speaking_rate,
        }
    }
}

/// Request body for the one-shot streamed HTTP endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkedRequest {
    pub text: String,
    pub voice_id: String,
    pub model_id: String,
    pub audio_config: AudioConfig,
    pub temperature: f64,
}

/// One newline-delimited record of the chunked response stream.
///
/// Exactly one of `result` / `error` is expected; anything else is treated
/// as protocol noise and skipped.
#[derive(Debug, Deserialize)]
pub struct ChunkedRecord {
    #[serde(default)]
    pub result: Option<AudioPayload>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

/// Base64-encoded audio bytes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPayload {
    pub audio_content: String,
}

/// Error object reported on the chunked path.
#[derive(Debug, Deserialize)]
pub struct ServiceError {
    pub message: String,
    pub code: i32,
}

/// Outbound socket message: an operation tagged with its context id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(flatten)]
    pub payload: OutboundPayload,
    pub context_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundPayload {
    Create(CreateContext),
    SendText { text: String },
    FlushContext {},
    CloseContext {},
}

/// Payload of the context-create message. The two buffering hints let the
/// service batch small text pushes instead of synthesizing word by word.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContext {
    pub voice_id: String,
    pub model_id: String,
    pub audio_config: AudioConfig,
    pub temperature: f64,
    pub buffer_char_threshold: u32,
    pub max_buffer_delay_ms: u32,
}

impl CreateContext {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            audio_config: AudioConfig::from_config(config),
            temperature: config.temperature,
            buffer_char_threshold: BUFFER_CHAR_THRESHOLD,
            max_buffer_delay_ms: MAX_BUFFER_DELAY_MS,
        }
    }
}

/// Inbound socket message envelope.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub result: Option<InboundResult>,
}

/// The service multiplexes every inbound shape through `result`; which of
/// the optional fields is set acts as the discriminant.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundResult {
    #[serde(default)]
    pub status: Option<ServiceStatus>,
    #[serde(default)]
    pub context_created: Option<serde_json::Value>,
    #[serde(default)]
    pub context_closed: Option<serde_json::Value>,
    #[serde(default)]
    pub audio_chunk: Option<AudioPayload>,
}

/// Status attached to inbound socket messages. Code 0 is success; anything
/// else aborts the session with the message passed through verbatim.
#[derive(Debug, Deserialize)]
pub struct ServiceStatus {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> SynthesisConfig {
        SynthesisConfig::new("key").with_voice("river").with_model("lyrebird-1")
    }

    #[test]
    fn chunked_request_wire_shape() {
        let request = ChunkedRequest {
            text: "hello".to_string(),
            voice_id: "river".to_string(),
            model_id: "lyrebird-1".to_string(),
            audio_config: AudioConfig::from_config(&config()),
            temperature: 0.8,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "text": "hello",
                "voiceId": "river",
                "modelId": "lyrebird-1",
                "audioConfig": {
                    "audioEncoding": "PCM16",
                    "bitrate": 64000,
                    "sampleRateHertz": 48000,
                    "speakingRate": 1.0,
                },
                "temperature": 0.8,
            })
        );
    }

    #[test]
    fn outbound_send_text_is_externally_tagged() {
        let message = OutboundMessage {
            payload: OutboundPayload::SendText {
                text: "hi".to_string(),
            },
            context_id: "ctx-1".to_string(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"send_text": {"text": "hi"}, "contextId": "ctx-1"})
        );
    }

    #[test]
    fn outbound_flush_and_close_have_empty_bodies() {
        let flush = OutboundMessage {
            payload: OutboundPayload::FlushContext {},
            context_id: "ctx-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&flush).unwrap(),
            json!({"flush_context": {}, "contextId": "ctx-1"})
        );

        let close = OutboundMessage {
            payload: OutboundPayload::CloseContext {},
            context_id: "ctx-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&close).unwrap(),
            json!({"close_context": {}, "contextId": "ctx-1"})
        );
    }

    #[test]
    fn create_carries_buffering_hints() {
        let message = OutboundMessage {
            payload: OutboundPayload::Create(CreateContext::from_config(&config())),
            context_id: "ctx-1".to_string(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["create"]["bufferCharThreshold"], json!(32));
        assert_eq!(value["create"]["maxBufferDelayMs"], json!(200));
        assert_eq!(value["create"]["voiceId"], json!("river"));
        assert_eq!(value["contextId"], json!("ctx-1"));
    }

    #[test]
    fn inbound_audio_chunk_parses() {
        let text = r#"{"result":{"audioChunk":{"audioContent":"AAAA"}}}"#;
        let message: InboundMessage = serde_json::from_str(text).unwrap();
        let result = message.result.unwrap();
        assert!(result.audio_chunk.is_some());
        assert!(result.context_created.is_none());
    }

    #[test]
    fn inbound_status_defaults_message() {
        let text = r#"{"result":{"status":{"code":7}}}"#;
        let message: InboundMessage = serde_json::from_str(text).unwrap();
        let status = message.result.unwrap().status.unwrap();
        assert_eq!(status.code, 7);
        assert_eq!(status.message, "");
    }
}
