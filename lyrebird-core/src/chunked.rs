//! One-shot streamed synthesis over HTTP
//!
//! The full text goes out in a single POST; the response body is a live
//! stream of newline-delimited JSON records, each carrying either a base64
//! audio payload or a service error.

use anyhow::anyhow;
use base64::Engine;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use tokio::sync::mpsc;

use crate::config::SynthesisConfig;
use crate::error::TtsError;
use crate::events::{SynthesisEvent, SynthesisStream, EVENT_CHANNEL_CAPACITY};
use crate::frame::{AudioFrame, FrameAssembler};
use crate::protocol::{AudioConfig, ChunkedRecord, ChunkedRequest};
use crate::session::SessionHandle;

/// Chunked sessions have no server-side context; every event shares one
/// segment.
const SEGMENT_ID: &str = "0";

/// Spawn a chunked session. The request itself runs on the spawned task, so
/// transport failures surface through the returned stream.
pub(crate) fn start(
    client: reqwest::Client,
    config: SynthesisConfig,
    text: String,
) -> SynthesisStream {
    let handle = SessionHandle::new();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let task_handle = handle.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = task_handle.closed() => {
                tracing::debug!("chunked session cancelled");
            }
            result = run(client, config, text, event_tx.clone()) => {
                if let Err(e) = result {
                    let _ = event_tx.send(Err(e)).await;
                }
            }
        }
        task_handle.close();
    });

    SynthesisStream::new(event_rx, handle)
}

async fn run(
    client: reqwest::Client,
    config: SynthesisConfig,
    text: String,
    events: mpsc::Sender<Result<SynthesisEvent, TtsError>>,
) -> Result<(), TtsError> {
    let request_id = request_id(&text);
    let request = ChunkedRequest {
        text: text.clone(),
        voice_id: config.voice_id.clone(),
        model_id: config.model_id.clone(),
        audio_config: AudioConfig::from_config(&config),
        temperature: config.temperature,
    };

    tracing::debug!(
        url = %config.http_url,
        request_id = %request_id,
        text_len = text.len(),
        "starting chunked synthesis"
    );

    let response = client
        .post(&config.http_url)
        .header(AUTHORIZATION, config.authorization())
        .json(&request)
        .send()
        .await
        .map_err(|e| TtsError::Transport(anyhow!(e).context("synthesis request failed")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TtsError::Transport(anyhow!(
            "synthesis endpoint returned {status}: {body}"
        )));
    }

    let mut assembler =
        FrameAssembler::new(config.frame_size(), config.sample_rate, config.channels);
    let mut decoder = LineDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|e| TtsError::Transport(anyhow!(e).context("response stream interrupted")))?;
        for line in decoder.push(&chunk) {
            if !emit_line(&line, &mut assembler, &request_id, &events).await? {
                return Ok(());
            }
        }
    }
    // A trailing line without a newline can no longer grow once the body ends
    if let Some(line) = decoder.finish() {
        if !emit_line(&line, &mut assembler, &request_id, &events).await? {
            return Ok(());
        }
    }

    let frame = assembler
        .flush()
        .unwrap_or_else(|| AudioFrame::empty(config.sample_rate, config.channels));
    let _ = events
        .send(Ok(SynthesisEvent {
            request_id,
            segment_id: SEGMENT_ID.to_string(),
            frame,
            is_final: true,
        }))
        .await;
    Ok(())
}

/// Push one decoded line's audio through the assembler and emit the
/// resulting frames. Returns Ok(false) when the consumer is gone.
async fn emit_line(
    line: &str,
    assembler: &mut FrameAssembler,
    request_id: &str,
    events: &mpsc::Sender<Result<SynthesisEvent, TtsError>>,
) -> Result<bool, TtsError> {
    let Some(outcome) = decode_line(line) else {
        return Ok(true);
    };
    let audio = outcome?;
    for frame in assembler.write(&audio) {
        let event = SynthesisEvent {
            request_id: request_id.to_string(),
            segment_id: SEGMENT_ID.to_string(),
            frame,
            is_final: false,
        };
        if events.send(Ok(event)).await.is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Classify one response line. `None` means the line is protocol noise and
/// is skipped.
fn decode_line(line: &str) -> Option<Result<Vec<u8>, TtsError>> {
    let record = match serde_json::from_str::<ChunkedRecord>(line) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed response line");
            return None;
        }
    };

    if let Some(error) = record.error {
        return Some(Err(TtsError::Protocol {
            message: error.message,
            code: error.code,
        }));
    }

    let Some(result) = record.result else {
        tracing::warn!("skipping response line with neither result nor error");
        return None;
    };

    match base64::engine::general_purpose::STANDARD.decode(result.audio_content.as_bytes()) {
        Ok(bytes) => Some(Ok(bytes)),
        Err(e) => {
            tracing::warn!(error = %e, "skipping audio content that is not valid base64");
            None
        }
    }
}

/// Incremental splitter for newline-delimited JSON. A partial trailing line
/// is held back until more bytes arrive or the stream ends.
struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

/// Request id derived from a prefix of the text, fixed per session.
fn request_id(text: &str) -> String {
    let prefix: String = text
        .chars()
        .take(12)
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    format!("tts-{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn audio_line(bytes: &[u8]) -> String {
        format!(r#"{{"result":{{"audioContent":"{}"}}}}"#, encode(bytes))
    }

    #[test]
    fn decoder_holds_partial_trailing_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"result\":").is_empty());
        let lines = decoder.push(b"{\"audioContent\":\"AAAA\"}}\n{\"par");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("audioContent"));

        let lines = decoder.push(b"tial\":1}\n");
        assert_eq!(lines, vec![r#"{"partial":1}"#.to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn decoder_finish_yields_unterminated_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"a\":1}").is_empty());
        assert_eq!(decoder.finish(), Some(r#"{"a":1}"#.to_string()));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn decoder_skips_blank_lines() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"\n\r\n{\"a\":1}\r\n");
        assert_eq!(lines, vec![r#"{"a":1}"#.to_string()]);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        assert!(decode_line("not json").is_none());
    }

    #[test]
    fn line_without_result_or_error_is_skipped() {
        assert!(decode_line(r#"{"unexpected":true}"#).is_none());
    }

    #[test]
    fn invalid_base64_is_skipped() {
        assert!(decode_line(r#"{"result":{"audioContent":"!!!"}}"#).is_none());
    }

    #[test]
    fn error_record_aborts_with_service_message() {
        let outcome = decode_line(r#"{"error":{"message":"quota exceeded","code":7}}"#)
            .expect("error records are not skipped");
        match outcome {
            Err(TtsError::Protocol { message, code }) => {
                assert_eq!(message, "quota exceeded");
                assert_eq!(code, 7);
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn audio_record_decodes_payload() {
        let line = audio_line(&[1, 2, 3, 4]);
        let audio = decode_line(&line).unwrap().unwrap();
        assert_eq!(audio, vec![1, 2, 3, 4]);
    }

    #[test]
    fn noise_then_audio_yields_one_payload() {
        let mut decoder = LineDecoder::new();
        let input = format!("not json\n{}\n", audio_line(&[0u8; 8]));

        let mut payloads = Vec::new();
        for line in decoder.push(input.as_bytes()) {
            if let Some(outcome) = decode_line(&line) {
                payloads.push(outcome.expect("no error expected"));
            }
        }
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].len(), 8);
    }

    #[tokio::test]
    async fn frames_account_for_every_decoded_byte() {
        // two payloads of 5 and 4 bytes against a 4-byte frame: two full
        // frames plus a one-byte remainder at flush
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut assembler = FrameAssembler::new(4, 48000, 1);

        for payload in [vec![1u8; 5], vec![2u8; 4]] {
            let line = audio_line(&payload);
            assert!(emit_line(&line, &mut assembler, "tts-test", &tx).await.unwrap());
        }
        let remainder = assembler.flush().expect("one byte should remain");
        assert_eq!(remainder.data.len(), 1);

        drop(tx);
        let mut streamed = 0;
        while let Some(event) = rx.recv().await {
            let event = event.unwrap();
            assert!(!event.is_final);
            assert_eq!(event.frame.data.len(), 4);
            streamed += event.frame.data.len();
        }
        assert_eq!(streamed + remainder.data.len(), 9);
    }

    #[test]
    fn request_id_uses_text_prefix() {
        assert_eq!(request_id("hello world"), "tts-hello-world");
        assert_eq!(request_id(""), "tts-");
    }
}
