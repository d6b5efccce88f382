//! Engine facade: owns configuration and tracks live sessions

use std::sync::{Arc, Mutex, Weak};

use crate::chunked;
use crate::config::{SynthesisConfig, SynthesisOptions, API_KEY_ENV};
use crate::error::TtsError;
use crate::events::SynthesisStream;
use crate::frame::AudioFrame;
use crate::session::SessionHandle;
use crate::streaming::{self, TextSink};

/// Single construction point for both session types.
///
/// The engine holds the current configuration (voice/model/temperature/
/// speaking rate are mutable between sessions) and weak references to every
/// live session so [`close_all`](Self::close_all) can tear them down in one
/// call. Sessions never outlive that call.
pub struct TtsEngine {
    config: Mutex<SynthesisConfig>,
    client: reqwest::Client,
    sessions: Mutex<Vec<Weak<SessionHandle>>>,
}

impl TtsEngine {
    /// Build an engine. Fails fast when no credential is available from the
    /// config or the `LYREBIRD_API_KEY` environment variable.
    pub fn new(mut config: SynthesisConfig) -> Result<Self, TtsError> {
        if config.api_key.is_empty() {
            config.api_key = std::env::var(API_KEY_ENV)
                .ok()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    TtsError::Configuration(format!(
                        "no API key: set SynthesisConfig::api_key or {API_KEY_ENV}"
                    ))
                })?;
        }
        if config.sample_rate == 0 {
            return Err(TtsError::Configuration("sample rate must be positive".into()));
        }

        Ok(Self {
            config: Mutex::new(config),
            client: reqwest::Client::new(),
            sessions: Mutex::new(Vec::new()),
        })
    }

    /// Change voice, model, temperature, or speaking rate. Affects sessions
    /// created afterwards; running sessions keep the configuration they
    /// captured at creation.
    pub fn update_options(&self, options: SynthesisOptions) {
        let mut config = self.config.lock().unwrap();
        if let Some(voice_id) = options.voice_id {
            config.voice_id = voice_id;
        }
        if let Some(model_id) = options.model_id {
            config.model_id = model_id;
        }
        if let Some(temperature) = options.temperature {
            config.temperature = temperature;
        }
        if let Some(speaking_rate) = options.speaking_rate {
            config.speaking_rate = speaking_rate;
        }
    }

    /// Snapshot of the configuration future sessions will use.
    pub fn config(&self) -> SynthesisConfig {
        self.config.lock().unwrap().clone()
    }

    /// Start a one-shot session that synthesizes `text` over the streamed
    /// HTTP endpoint. Transport failures surface through the stream.
    pub fn create_chunked_session(&self, text: impl Into<String>) -> SynthesisStream {
        let stream = chunked::start(self.client.clone(), self.config(), text.into());
        self.register(stream.handle().clone());
        stream
    }

    /// Open a bidirectional session: a [`TextSink`] for incremental text and
    /// a stream of audio frames. Fails fast if the socket cannot be opened.
    pub async fn create_streaming_session(
        &self,
    ) -> Result<(TextSink, SynthesisStream), TtsError> {
        let (sink, stream) = streaming::start(self.config()).await?;
        self.register(stream.handle().clone());
        Ok((sink, stream))
    }

    /// Run a chunked session to completion and return all audio as one
    /// buffer.
    pub async fn synthesize(&self, text: impl Into<String>) -> Result<AudioFrame, TtsError> {
        let config = self.config();
        let mut stream = self.create_chunked_session(text);

        let mut data = Vec::new();
        while let Some(event) = stream.recv().await {
            data.extend(event?.frame.data);
        }
        Ok(AudioFrame {
            data,
            sample_rate: config.sample_rate,
            channels: config.channels,
        })
    }

    /// Close every live session and clear the registry. Idempotent; safe to
    /// call while sessions are mid-utterance.
    pub fn close_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock().unwrap());
        let mut closed = 0;
        for session in sessions {
            if let Some(session) = session.upgrade() {
                session.close();
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::debug!(closed, "closed live synthesis sessions");
        }
    }

    fn register(&self, handle: Arc<SessionHandle>) {
        let mut sessions = self.sessions.lock().unwrap();
        // Drop bookkeeping for sessions that already went away
        sessions.retain(|session| session.strong_count() > 0);
        sessions.push(Arc::downgrade(&handle));
    }
}

impl Drop for TtsEngine {
    fn drop(&mut self) {
        self.close_all();
    }
}
