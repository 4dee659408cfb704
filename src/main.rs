use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hark_voice::audio::rms;
use hark_voice::{PipelineConfig, VoiceEvent, VoicePipeline};

/// Hark - wake-word voice-activation pipeline
#[derive(Parser)]
#[command(name = "hark", version, about)]
struct Cli {
    /// Wake keyword (overrides the config file)
    #[arg(short, long, env = "HARK_KEYWORD")]
    keyword: Option<String>,

    /// Run in continuous mode (transcribe fixed clips, no keyword)
    #[arg(long)]
    continuous: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Transcribe a WAV file and print the text
    Transcribe {
        /// Path to a 16-bit PCM WAV file
        file: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,hark_voice=info",
        1 => "info,hark_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::load()?;
    if let Some(keyword) = cli.keyword {
        config.keyword = keyword;
    }
    if cli.continuous {
        config.continuous_default = true;
    }
    config.validate()?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(config, duration).await,
            Command::Transcribe { file } => transcribe_file(config, &file).await,
        };
    }

    tracing::info!(
        keyword = %config.keyword,
        continuous = config.continuous_default,
        "starting voice pipeline"
    );

    let mut pipeline = VoicePipeline::new(config.clone())?;
    pipeline.subscribe(|event| match event {
        VoiceEvent::KeywordDetected(text) => tracing::info!(text, "keyword detected"),
        VoiceEvent::CommandListenStarted => tracing::info!("listening for command"),
        VoiceEvent::CommandHeard(text) => println!("command: {text}"),
        VoiceEvent::EmptyCommandHeard => tracing::info!("no command heard"),
        VoiceEvent::SpeechRecognized(text) => tracing::info!(text, "speech recognized"),
    });

    pipeline.start_keyword_listening()?;
    if config.continuous_default {
        tracing::info!("pipeline ready - transcribing continuously");
    } else {
        tracing::info!("pipeline ready - say \"{}\"", config.keyword);
    }

    pipeline.run().await?;
    Ok(())
}

/// Test microphone input with a level meter
#[allow(clippy::future_not_send)]
async fn test_mic(config: PipelineConfig, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut pipeline = VoicePipeline::new(config)?;
    let sample_rate = pipeline.start_capture()?;
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let energy = pipeline.compute_recent_rms(1.0);
        let peak = pipeline
            .read_last_seconds(1.0)
            .map(|w| w.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max))
            .unwrap_or(0.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    pipeline.teardown();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working.");
    println!("If RMS stayed near 0, check your input device and levels.");

    Ok(())
}

/// Transcribe a WAV file from disk
#[allow(clippy::future_not_send, clippy::cast_precision_loss)]
async fn transcribe_file(config: PipelineConfig, path: &str) -> anyhow::Result<()> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = f32::from(i16::MAX);
            reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .map(|s| f32::from(s) / scale)
                .collect()
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    // Down-mix interleaved channels to mono.
    let mono: Vec<f32> = if spec.channels > 1 {
        let channels = usize::from(spec.channels);
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    tracing::info!(
        path,
        frames = mono.len(),
        sample_rate = spec.sample_rate,
        rms = rms(&mono),
        "transcribing file"
    );

    let pipeline = VoicePipeline::new(config)?;
    let result = pipeline.transcribe(&mono, spec.sample_rate).await;

    if !result.success {
        anyhow::bail!("transcription failed");
    }

    match result.text {
        Some(text) => println!("{text}"),
        None => println!("(no speech recognized)"),
    }

    Ok(())
}
