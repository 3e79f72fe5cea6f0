//! Configuration management for the vox gateway
//!
//! All settings come from `VOX_*` environment variables with documented
//! defaults, so the gateway can run headless from a unit file or container
//! without a config file on disk.

use std::env;
use std::time::Duration;

use crate::{Error, Result};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Message bus configuration
    pub bus: BusConfig,

    /// Audio device configuration
    pub audio: AudioConfig,

    /// Voice pipeline configuration
    pub voice: VoiceConfig,
}

/// Message bus connection settings
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Bus server URL (`VOX_BUS_URL`, default `nats://127.0.0.1:4222`)
    pub url: String,

    /// Logical source name used in subjects (`VOX_SOURCE`, default `assistant`)
    pub source: String,
}

/// Audio device settings
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Input device name substring; `None` selects the default device
    /// (`VOX_INPUT_DEVICE`)
    pub input_device: Option<String>,

    /// Output device name substring; `None` selects the default device
    /// (`VOX_OUTPUT_DEVICE`)
    pub output_device: Option<String>,

    /// Capture sample rate in Hz (`VOX_INPUT_RATE`, default 48000)
    pub input_rate: u32,

    /// Playback sample rate in Hz (`VOX_OUTPUT_RATE`, default 44100)
    pub output_rate: u32,
}

/// Voice pipeline settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Wake phrase (`VOX_WAKE_WORD`, default `hey vox`)
    pub wake_word: String,

    /// Detector sensitivity in `0.0..=1.0` (`VOX_SENSITIVITY`, default 0.7)
    pub sensitivity: f32,

    /// Silence window that ends an utterance once speech has started
    /// (`VOX_SILENCE_TIMEOUT` seconds, default 0.8)
    pub silence_timeout: Duration,

    /// Longer window allowed for the user to begin speaking after a
    /// wake/force trigger (`VOX_FIRST_SILENCE_TIMEOUT` seconds, default 5.0)
    pub first_silence_timeout: Duration,

    /// STT model directory (`VOX_STT_MODEL_PATH`, default `/models/stt`)
    pub stt_model_path: String,

    /// TTS model path (`VOX_TTS_MODEL_PATH`, default `/models/tts`)
    pub tts_model_path: String,

    /// External TTS command producing raw s16le PCM on stdout
    /// (`VOX_TTS_COMMAND`, default `piper`)
    pub tts_command: String,

    /// Sample rate of the TTS command's raw output in Hz
    /// (`VOX_TTS_RATE`, default 22050)
    pub tts_rate: u32,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but unparseable, or a value is
    /// out of range
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bus: BusConfig {
                url: var_or("VOX_BUS_URL", "nats://127.0.0.1:4222"),
                source: var_or("VOX_SOURCE", "assistant"),
            },
            audio: AudioConfig {
                input_device: env::var("VOX_INPUT_DEVICE").ok().filter(|s| !s.is_empty()),
                output_device: env::var("VOX_OUTPUT_DEVICE").ok().filter(|s| !s.is_empty()),
                input_rate: parse_var("VOX_INPUT_RATE", 48_000)?,
                output_rate: parse_var("VOX_OUTPUT_RATE", 44_100)?,
            },
            voice: VoiceConfig {
                wake_word: var_or("VOX_WAKE_WORD", "hey vox"),
                sensitivity: parse_var("VOX_SENSITIVITY", 0.7_f32)?,
                silence_timeout: secs_var("VOX_SILENCE_TIMEOUT", 0.8)?,
                first_silence_timeout: secs_var("VOX_FIRST_SILENCE_TIMEOUT", 5.0)?,
                stt_model_path: var_or("VOX_STT_MODEL_PATH", "/models/stt"),
                tts_model_path: var_or("VOX_TTS_MODEL_PATH", "/models/tts"),
                tts_command: var_or("VOX_TTS_COMMAND", "piper"),
                tts_rate: parse_var("VOX_TTS_RATE", 22_050)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.voice.sensitivity) {
            return Err(Error::Config(format!(
                "VOX_SENSITIVITY must be within 0.0..=1.0, got {}",
                self.voice.sensitivity
            )));
        }
        if self.audio.input_rate == 0 || self.audio.output_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".to_string()));
        }
        if self.voice.tts_rate == 0 {
            return Err(Error::Config("VOX_TTS_RATE must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid {name}: {raw}"))),
        _ => Ok(default),
    }
}

fn secs_var(name: &str, default: f64) -> Result<Duration> {
    let secs: f64 = parse_var(name, default)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::Config(format!("{name} must be a non-negative number of seconds")));
    }
    Ok(Duration::from_secs_f64(secs))
}
