use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vox_gateway::audio::{DeviceSoundIo, SoundIo, samples_to_wav};
use vox_gateway::voice::Speaker;
use vox_gateway::voice::builtin;
use vox_gateway::{Config, Daemon};

/// Vox - wake-word voice front-end for message-bus dialog backends
#[derive(Parser)]
#[command(name = "vox", version, about)]
struct Cli {
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

        /// Write the captured audio to a WAV file
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output through the playback queue
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,vox_gateway=info",
        1 => "info,vox_gateway=debug",
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, dump } => test_mic(&config, duration, dump.as_deref()).await,
            Command::TestSpeaker => test_speaker(&config),
            Command::TestTts { text } => test_tts(config, &text).await,
        };
    }

    tracing::info!(
        bus = %config.bus.url,
        source = %config.bus.source,
        "starting vox gateway"
    );
    tracing::debug!(?config, "loaded configuration");

    let engines = builtin::engines_from_config(&config.voice);
    Daemon::new(config).run(engines).await?;

    Ok(())
}

/// Test microphone input
async fn test_mic(config: &Config, duration: u64, dump: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let sound = DeviceSoundIo::new(config.audio.clone());
    let rate = sound.input_rate();
    println!("Sample rate: {rate} Hz");
    println!("---");

    let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let capture_buffer = Arc::clone(&buffer);
    sound.start_input(Box::new(move |frame| {
        if let Ok(mut buf) = capture_buffer.lock() {
            buf.extend_from_slice(frame);
        }
    }))?;

    let mut all_samples: Vec<f32> = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = buffer.lock().map(|mut buf| std::mem::take(&mut *buf)).unwrap_or_default();
        let energy = calculate_rms(&second);
        let peak = second.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]", i + 1, energy, peak, meter);

        all_samples.extend(second);
    }

    sound.stop_input();

    if let Some(path) = dump {
        let wav = samples_to_wav(&all_samples, rate)?;
        std::fs::write(path, wav)?;
        println!("\nWrote {} samples to {}", all_samples.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sound = DeviceSoundIo::new(config.audio.clone());
    let rate = sound.output_rate();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let num_samples = (rate as f32 * 2.0) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / rate as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {rate} Hz...", samples.len());
    sound.play_chunks(&mut std::iter::once(samples))?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS through the sequential playback queue
async fn test_tts(config: Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let engines = builtin::engines_from_config(&config.voice);
    let sound: Arc<dyn SoundIo> = Arc::new(DeviceSoundIo::new(config.audio.clone()));

    let speaker = Speaker::spawn(engines.synthesizer, sound)?;
    speaker.handle().speak(text);

    println!("Synthesizing and playing...");
    tokio::task::spawn_blocking(move || speaker.shutdown()).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
