//! Synthesis event sequence delivered to the caller

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::TtsError;
use crate::frame::AudioFrame;
use crate::session::SessionHandle;

/// Events emitted by a session carry at most this many frames of backlog
/// before the producing task is backpressured.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 32;

/// One audio frame of synthesized speech.
///
/// `is_final` marks the authoritative end of a session's output: consumers
/// must treat it, not stream closure, as the completion signal. The final
/// event's frame carries the assembler's flushed remainder and may be empty.
#[derive(Debug, Clone)]
pub struct SynthesisEvent {
    pub request_id: String,
    pub segment_id: String,
    pub frame: AudioFrame,
    pub is_final: bool,
}

/// Lazy, ordered sequence of synthesis events.
///
/// Frames arrive in the order their bytes were received from the transport.
/// After a final event or an error the sequence yields `None`. Dropping the
/// stream (or calling [`close`](Self::close)) tears down the underlying
/// transport, so a consumer can abandon a session mid-utterance.
pub struct SynthesisStream {
    receiver: mpsc::Receiver<Result<SynthesisEvent, TtsError>>,
    handle: Arc<SessionHandle>,
}

impl SynthesisStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Result<SynthesisEvent, TtsError>>,
        handle: Arc<SessionHandle>,
    ) -> Self {
        Self { receiver, handle }
    }

    /// Receive the next event. Returns `None` once the session has finished,
    /// failed (after the error has been yielded), or been closed.
    pub async fn recv(&mut self) -> Option<Result<SynthesisEvent, TtsError>> {
        self.receiver.recv().await
    }

    /// Tear down the session immediately. Idempotent; frames already
    /// received remain valid.
    pub fn close(&self) {
        self.handle.close();
    }

    pub(crate) fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }
}

impl Drop for SynthesisStream {
    fn drop(&mut self) {
        self.handle.close();
    }
}
