use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use lyrebird_core::{AudioEncoding, AudioFrame, SynthesisConfig, TtsEngine};

#[derive(Parser, Debug)]
#[command(name = "lyrebird")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Synthesize speech from the command line")]
struct Args {
    /// Text to synthesize
    #[arg(long)]
    text: String,

    /// Output path (raw audio bytes, or a WAV container with --wav)
    #[arg(long, default_value = "out.raw")]
    out: PathBuf,

    /// Use the bidirectional streaming transport instead of the one-shot request
    #[arg(long)]
    streaming: bool,

    /// Wrap the output in a WAV container (PCM16 only)
    #[arg(long)]
    wav: bool,

    /// Voice identifier
    #[arg(long)]
    voice: Option<String>,

    /// Model identifier
    #[arg(long)]
    model: Option<String>,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Audio encoding (PCM16, MP3, OGG_OPUS, ALAW, MULAW, FLAC)
    #[arg(long, default_value = "PCM16")]
    encoding: AudioEncoding,

    /// Speaking rate multiplier
    #[arg(long, default_value_t = 1.0)]
    speaking_rate: f64,

    /// API key; falls back to the LYREBIRD_API_KEY environment variable
    #[arg(long)]
    api_key: Option<String>,
}

fn main() -> Result<()> {
    setup_tracing();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    if args.wav && args.encoding != AudioEncoding::Pcm16 {
        bail!("--wav requires PCM16 output");
    }

    let mut config = SynthesisConfig::new(args.api_key.clone().unwrap_or_default())
        .with_sample_rate(args.sample_rate)
        .with_encoding(args.encoding)
        .with_speaking_rate(args.speaking_rate);
    if let Some(voice) = &args.voice {
        config = config.with_voice(voice.clone());
    }
    if let Some(model) = &args.model {
        config = config.with_model(model.clone());
    }

    let engine = TtsEngine::new(config)?;

    let audio = if args.streaming {
        synthesize_streaming(&engine, &args.text).await?
    } else {
        engine.synthesize(args.text.as_str()).await?
    };

    tracing::info!(
        bytes = audio.data.len(),
        streaming = args.streaming,
        "synthesis complete"
    );

    if args.wav {
        write_wav(&args.out, &audio)?;
    } else {
        std::fs::write(&args.out, &audio.data)
            .with_context(|| format!("failed to write {}", args.out.display()))?;
    }
    println!("Wrote {} bytes to {}", audio.data.len(), args.out.display());

    engine.close_all();
    Ok(())
}

/// Drive the bidirectional transport: push the text word by word the way a
/// live host would, then drain the frames.
async fn synthesize_streaming(engine: &TtsEngine, text: &str) -> Result<AudioFrame> {
    let (sink, mut stream) = engine.create_streaming_session().await?;

    for fragment in text.split_inclusive(' ') {
        sink.send_text(fragment).await?;
    }
    // Dropping the sink signals end of input
    drop(sink);

    let config = engine.config();
    let mut data = Vec::new();
    while let Some(event) = stream.recv().await {
        let event = event?;
        data.extend(event.frame.data);
        if event.is_final {
            break;
        }
    }
    Ok(AudioFrame {
        data,
        sample_rate: config.sample_rate,
        channels: config.channels,
    })
}

fn write_wav(path: &Path, audio: &AudioFrame) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for sample in audio.data.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}
