//! Bidirectional streamed synthesis over a websocket context
//!
//! One socket carries one synthesis context: the client announces the
//! context, pushes text fragments as the caller produces them, and receives
//! audio chunks as the service synthesizes. Two tasks drive the session —
//! outbound (caller input to socket) and inbound (socket to audio frames) —
//! sharing only the context id and the end-of-input flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::config::SynthesisConfig;
use crate::error::TtsError;
use crate::events::{SynthesisEvent, SynthesisStream, EVENT_CHANNEL_CAPACITY};
use crate::frame::{AudioFrame, FrameAssembler};
use crate::protocol::{CreateContext, InboundMessage, OutboundMessage, OutboundPayload};
use crate::session::SessionHandle;

const SEGMENT_ID: &str = "0";
const INPUT_CHANNEL_CAPACITY: usize = 32;

/// Caller input to a streaming session: a text fragment, or an explicit
/// flush of everything the service has buffered for this context.
#[derive(Debug)]
pub enum TextInput {
    Text(String),
    Flush,
}

/// Handle for pushing text into a streaming session.
///
/// Dropping the sink marks the caller's input as ended; the session then
/// flushes and closes its context and the event stream finishes with a
/// final event once the service acknowledges.
pub struct TextSink {
    sender: mpsc::Sender<TextInput>,
}

impl TextSink {
    /// Forward a text fragment to the context.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.sender
            .send(TextInput::Text(text.into()))
            .await
            .context("Session input channel closed")?;
        Ok(())
    }

    /// Ask the service to synthesize everything buffered so far.
    pub async fn flush(&self) -> Result<()> {
        self.sender
            .send(TextInput::Flush)
            .await
            .context("Session input channel closed")?;
        Ok(())
    }
}

/// Context lifecycle as seen by the inbound task. The outbound side's
/// flush/close sequencing is communicated through the end-of-input flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Creating,
    Active,
    Closed,
}

/// Connect, announce a context, and spawn the session's task pair.
///
/// Connection and create-message failures are returned directly; everything
/// after that surfaces through the event stream.
pub(crate) async fn start(
    config: SynthesisConfig,
) -> Result<(TextSink, SynthesisStream), TtsError> {
    let context_id = new_context_id();

    let mut request = config
        .ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| TtsError::Configuration(format!("invalid websocket endpoint: {e}")))?;
    request.headers_mut().insert(
        "Authorization",
        config
            .authorization()
            .parse()
            .map_err(|_| TtsError::Configuration("API key is not a valid header value".into()))?,
    );

    let (ws, _) = connect_async(request).await.map_err(|e| {
        TtsError::Transport(anyhow!(e).context("failed to connect to synthesis socket"))
    })?;
    let (mut write, mut read) = ws.split();

    // The context is announced before any caller text flows; text pushed
    // before the created acknowledgement simply queues at the transport.
    let create = OutboundMessage {
        payload: OutboundPayload::Create(CreateContext::from_config(&config)),
        context_id: context_id.clone(),
    };
    write
        .send(Message::Text(encode_outbound(&create)))
        .await
        .map_err(|e| TtsError::Transport(anyhow!(e).context("failed to send context create")))?;

    tracing::debug!(context_id = %context_id, url = %config.ws_url, "streaming context requested");

    let handle = SessionHandle::new();
    let (input_tx, mut input_rx) = mpsc::channel::<TextInput>(INPUT_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let input_ended = Arc::new(AtomicBool::new(false));

    let outbound_handle = handle.clone();
    let outbound_context = context_id.clone();
    let outbound_ended = input_ended.clone();
    tokio::spawn(async move {
        let drain = async {
            while let Some(item) = input_rx.recv().await {
                let payload = match item {
                    TextInput::Text(text) => OutboundPayload::SendText { text },
                    TextInput::Flush => OutboundPayload::FlushContext {},
                };
                let message = OutboundMessage {
                    payload,
                    context_id: outbound_context.clone(),
                };
                if let Err(e) = write.send(Message::Text(encode_outbound(&message))).await {
                    tracing::error!(context_id = %outbound_context, error = %e, "failed to send to synthesis socket");
                    return;
                }
            }

            // Caller input exhausted: flag it before the shutdown handshake
            // so the inbound task can tell a clean close from a drop
            outbound_ended.store(true, Ordering::SeqCst);
            for payload in [
                OutboundPayload::FlushContext {},
                OutboundPayload::CloseContext {},
            ] {
                let message = OutboundMessage {
                    payload,
                    context_id: outbound_context.clone(),
                };
                if let Err(e) = write.send(Message::Text(encode_outbound(&message))).await {
                    tracing::error!(context_id = %outbound_context, error = %e, "failed to send context shutdown");
                    return;
                }
            }
            tracing::debug!(context_id = %outbound_context, "context shutdown requested");
        };

        tokio::select! {
            _ = outbound_handle.closed() => {}
            _ = drain => {}
        }
        // The write half drops here, closing our side of the socket once
        // the session is cancelled or fully drained.
    });

    let inbound_handle = handle.clone();
    let inbound_context = context_id.clone();
    let inbound_ended = input_ended.clone();
    let mut assembler =
        FrameAssembler::new(config.frame_size(), config.sample_rate, config.channels);
    let sample_rate = config.sample_rate;
    let channels = config.channels;
    tokio::spawn(async move {
        let events = event_tx.clone();
        let context = inbound_context.clone();
        let pump = async move {
            let mut state = ContextState::Creating;
            while let Some(message) = read.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        // An abrupt drop surfaces as a read error; classify
                        // it below together with a plain end-of-stream
                        tracing::warn!(context_id = %context, error = %e, "synthesis socket read failed");
                        break;
                    }
                };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let Some(event) = parse_inbound(&text) else {
                    continue;
                };
                match event? {
                    InboundEvent::ContextCreated => {
                        tracing::debug!(context_id = %context, "context created");
                        state = ContextState::Active;
                    }
                    InboundEvent::Audio(bytes) => {
                        for frame in assembler.write(&bytes) {
                            let event = SynthesisEvent {
                                request_id: context.clone(),
                                segment_id: SEGMENT_ID.to_string(),
                                frame,
                                is_final: false,
                            };
                            if events.send(Ok(event)).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    InboundEvent::ContextClosed => {
                        // The only path that legitimately completes the session
                        state = ContextState::Closed;
                        let frame = assembler
                            .flush()
                            .unwrap_or_else(|| AudioFrame::empty(sample_rate, channels));
                        let _ = events
                            .send(Ok(SynthesisEvent {
                                request_id: context.clone(),
                                segment_id: SEGMENT_ID.to_string(),
                                frame,
                                is_final: true,
                            }))
                            .await;
                        tracing::debug!(context_id = %context, ?state, "final frame emitted");
                        return Ok(());
                    }
                }
            }

            // Socket ended without a contextClosed acknowledgement
            if inbound_ended.load(Ordering::SeqCst) {
                Err(TtsError::UnexpectedClose(format!(
                    "socket closed in state {state:?} before the service acknowledged shutdown"
                )))
            } else {
                Err(TtsError::UnexpectedClose(format!(
                    "socket closed in state {state:?} while caller input was still open"
                )))
            }
        };

        let result = tokio::select! {
            _ = inbound_handle.closed() => return,
            result = pump => result,
        };
        if let Err(e) = result {
            tracing::warn!(context_id = %inbound_context, error = %e, "streaming session failed");
            let _ = event_tx.send(Err(e)).await;
        }
        inbound_handle.close();
    });

    Ok((
        TextSink { sender: input_tx },
        SynthesisStream::new(event_rx, handle),
    ))
}

/// Decoded inbound socket events, one variant per discriminant field.
#[derive(Debug)]
enum InboundEvent {
    ContextCreated,
    ContextClosed,
    Audio(Vec<u8>),
}

/// Classify one inbound socket message. `None` means the message is
/// protocol noise and is skipped.
fn parse_inbound(text: &str) -> Option<Result<InboundEvent, TtsError>> {
    let message = match serde_json::from_str::<InboundMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed socket message");
            return None;
        }
    };

    let Some(result) = message.result else {
        tracing::warn!("skipping socket message without result");
        return None;
    };

    let has_status = result.status.is_some();
    if let Some(status) = result.status {
        if status.code != 0 {
            return Some(Err(TtsError::Protocol {
                message: status.message,
                code: status.code,
            }));
        }
    }

    if result.context_created.is_some() {
        return Some(Ok(InboundEvent::ContextCreated));
    }
    if result.context_closed.is_some() {
        return Some(Ok(InboundEvent::ContextClosed));
    }
    if let Some(chunk) = result.audio_chunk {
        return match base64::engine::general_purpose::STANDARD.decode(chunk.audio_content.as_bytes())
        {
            Ok(bytes) => Some(Ok(InboundEvent::Audio(bytes))),
            Err(e) => {
                tracing::warn!(error = %e, "skipping audio chunk that is not valid base64");
                None
            }
        };
    }

    if !has_status {
        tracing::warn!("skipping unrecognized socket message");
    }
    None
}

fn encode_outbound(message: &OutboundMessage) -> String {
    serde_json::to_string(message).expect("Failed to serialize outbound message - this is a bug")
}

/// Context ids are client-generated: wall-clock millis plus randomness,
/// unique per session instance.
fn new_context_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("ctx-{millis}-{}", &nonce[..8])
}
