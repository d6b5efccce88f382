//! Synthesis configuration shared by both session types

use serde::{Deserialize, Serialize};

pub const DEFAULT_HTTP_URL: &str = "https://api.lyrebird.dev/v1/tts/stream";
pub const DEFAULT_WS_URL: &str = "wss://api.lyrebird.dev/v1/tts/stream_bidi";

/// Environment variable consulted when no API key is set explicitly.
pub const API_KEY_ENV: &str = "LYREBIRD_API_KEY";

/// Duration of one emitted audio frame.
pub const FRAME_DURATION_MS: u32 = 20;

/// Audio encodings the synthesis service can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioEncoding {
    #[serde(rename = "PCM16")]
    Pcm16,
    #[serde(rename = "MP3")]
    Mp3,
    #[serde(rename = "OGG_OPUS")]
    OggOpus,
    #[serde(rename = "ALAW")]
    Alaw,
    #[serde(rename = "MULAW")]
    Mulaw,
    #[serde(rename = "FLAC")]
    Flac,
}

impl AudioEncoding {
    /// Bytes per sample for frame sizing. Compressed encodings are byte
    /// streams with no fixed sample width, so frames are sliced per byte.
    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            AudioEncoding::Pcm16 => 2,
            AudioEncoding::Mp3
            | AudioEncoding::OggOpus
            | AudioEncoding::Alaw
            | AudioEncoding::Mulaw
            | AudioEncoding::Flac => 1,
        }
    }
}

impl std::str::FromStr for AudioEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PCM16" => Ok(AudioEncoding::Pcm16),
            "MP3" => Ok(AudioEncoding::Mp3),
            "OGG_OPUS" => Ok(AudioEncoding::OggOpus),
            "ALAW" => Ok(AudioEncoding::Alaw),
            "MULAW" => Ok(AudioEncoding::Mulaw),
            "FLAC" => Ok(AudioEncoding::Flac),
            _ => Err(format!("unknown audio encoding: {s}")),
        }
    }
}

/// Immutable parameter bundle for a synthesis session.
///
/// A session captures the configuration when it is created; updates through
/// [`crate::engine::TtsEngine::update_options`] affect future sessions only.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Opaque credential, carried as a Basic authorization value.
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    /// Output sample rate in Hz. Must be > 0.
    pub sample_rate: u32,
    /// The service only produces mono audio.
    pub channels: u16,
    pub encoding: AudioEncoding,
    /// Bit rate in bps. Only used by compressed encodings.
    pub bitrate: u32,
    /// Synthesis randomness.
    pub temperature: f64,
    /// Speaking rate multiplier.
    pub speaking_rate: f64,
    pub http_url: String,
    pub ws_url: String,
}

impl SynthesisConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            voice_id: "ashley".to_string(),
            model_id: "lyrebird-1".to_string(),
            sample_rate: 48000,
            channels: 1,
            encoding: AudioEncoding::Pcm16,
            bitrate: 64000,
            temperature: 0.8,
            speaking_rate: 1.0,
            http_url: DEFAULT_HTTP_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }

    /// Default configuration with the credential left to the environment.
    pub fn from_env() -> Self {
        Self::new(String::new())
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_encoding(mut self, encoding: AudioEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_speaking_rate(mut self, speaking_rate: f64) -> Self {
        self.speaking_rate = speaking_rate;
        self
    }

    pub fn with_http_url(mut self, url: impl Into<String>) -> Self {
        self.http_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Size in bytes of one full frame at this configuration.
    pub fn frame_size(&self) -> usize {
        let samples_per_frame = (self.sample_rate * FRAME_DURATION_MS) / 1000;
        (samples_per_frame * self.channels as u32 * self.encoding.bytes_per_sample()) as usize
    }

    /// Authorization header value for both transports.
    pub fn authorization(&self) -> String {
        format!("Basic {}", self.api_key)
    }
}

/// Subset of [`SynthesisConfig`] the engine facade can change between
/// sessions. Unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOptions {
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub temperature: Option<f64>,
    pub speaking_rate: Option<f64>,
}
