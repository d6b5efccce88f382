use thiserror::Error;

/// Errors surfaced by synthesis sessions.
///
/// Malformed wire messages are not represented here: the service
/// occasionally interleaves noise with real records, so unparseable
/// lines and socket frames are logged and skipped at the parse site.
#[derive(Error, Debug)]
pub enum TtsError {
    /// Missing or unusable configuration. Fatal at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection failure, non-success HTTP status, or a broken stream.
    /// Fatal to the in-flight session only.
    #[error("Transport error: {0}")]
    Transport(anyhow::Error),

    /// An error reported by the synthesis service, passed through verbatim.
    #[error("Service error (code {code}): {message}")]
    Protocol { message: String, code: i32 },

    /// The socket closed before the shutdown handshake completed.
    /// Distinguishes a mid-utterance drop from a clean finish.
    #[error("Unexpected close: {0}")]
    UnexpectedClose(String),
}
