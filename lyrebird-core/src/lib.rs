pub mod chunked;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod streaming;

// Public library API - hosts embedding the client should only need these.
pub use config::{AudioEncoding, SynthesisConfig, SynthesisOptions};
pub use engine::TtsEngine;
pub use error::TtsError;
pub use events::{SynthesisEvent, SynthesisStream};
pub use frame::{AudioFrame, FrameAssembler};
pub use streaming::{TextInput, TextSink};
