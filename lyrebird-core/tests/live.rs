//! Integration tests against the real synthesis service
//!
//! # Running live tests
//!
//! These tests require a service credential. They are marked #[ignore]
//! by default and won't run in normal CI.
//!
//! To run:
//! ```sh
//! LYREBIRD_API_KEY=... cargo test -p lyrebird-core --test live -- --ignored
//! ```

use lyrebird_core::{SynthesisConfig, TtsEngine};

#[tokio::test]
#[ignore] // Requires a service credential
async fn test_live_chunked_synthesis() {
    tracing_subscriber::fmt::init();

    let engine = TtsEngine::new(SynthesisConfig::from_env()).expect("Failed to create engine");

    let mut stream = engine.create_chunked_session("Hello, this is a test of text to speech.");

    let mut frames = 0;
    let mut bytes = 0;
    let mut finals = 0;
    while let Some(event) = stream.recv().await {
        let event = event.expect("Synthesis failed");
        bytes += event.frame.data.len();
        if event.is_final {
            finals += 1;
        } else {
            frames += 1;
        }
    }

    println!("Received {frames} frames, {bytes} bytes");
    assert!(bytes > 0, "Expected audio output");
    assert_eq!(finals, 1, "Expected exactly one final event");
}

#[tokio::test]
#[ignore] // Requires a service credential
async fn test_live_streaming_synthesis() {
    tracing_subscriber::fmt::init();

    let engine = TtsEngine::new(SynthesisConfig::from_env()).expect("Failed to create engine");

    let (sink, mut stream) = engine
        .create_streaming_session()
        .await
        .expect("Failed to open streaming session");

    for fragment in ["Hello, ", "this is a test ", "of incremental synthesis."] {
        sink.send_text(fragment).await.expect("Failed to send text");
    }
    // Dropping the sink signals end of input
    drop(sink);

    let mut bytes = 0;
    let mut finals = 0;
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(30);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(tokio::time::Duration::from_secs(10), stream.recv()).await {
            Ok(Some(event)) => {
                let event = event.expect("Synthesis failed");
                bytes += event.frame.data.len();
                if event.is_final {
                    finals += 1;
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }

    println!("Received {bytes} bytes");
    assert!(bytes > 0, "Expected audio output");
    assert_eq!(finals, 1, "Expected exactly one final event");
}
