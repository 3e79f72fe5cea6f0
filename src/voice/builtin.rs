//! Built-in reference engines
//!
//! These run without native model libraries so the gateway works out of the
//! box: an energy-threshold wake detector, a voice-activity-only recognizer,
//! and a synthesizer that adapts an external TTS command's raw PCM output.
//! Model-backed engines plug in through the same traits.

use std::io::{Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::config::VoiceConfig;
use crate::voice::{
    AudioChunk, ChunkStream, SpeechSynthesizer, StreamingRecognizer, Transcription, VoiceEngines,
    WakeWordDetector,
};
use crate::{Error, Result};

/// Model sample rate shared by the built-in detector and recognizer
pub const MODEL_SAMPLE_RATE: u32 = 16_000;

/// Detector frame length in samples (32 ms at 16 kHz)
pub const DETECTOR_FRAME: usize = 512;

/// Consecutive voiced frames required before the detector fires (~250 ms)
const WAKE_VOICED_FRAMES: usize = 8;

/// Read size for the TTS command's stdout, in bytes
const TTS_READ_BYTES: usize = 8192;

/// Map a 0..=1 sensitivity to an RMS threshold. Higher sensitivity means a
/// lower threshold, down to a floor that keeps ambient noise from firing.
fn rms_threshold(sensitivity: f32) -> f32 {
    let clamped = sensitivity.clamp(0.0, 1.0);
    0.005 + (1.0 - clamped) * 0.095
}

/// RMS energy of an i16 frame, normalized to `[0.0, 1.0]`
#[allow(clippy::cast_precision_loss)]
fn frame_energy(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = frame
        .iter()
        .map(|&s| {
            let v = f32::from(s) / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / frame.len() as f32).sqrt()
}

/// Energy-threshold wake detector.
///
/// Fires (keyword index 0) after a sustained run of voiced frames. It cannot
/// tell wake phrases apart from other speech; it exists so the gateway is
/// usable before a phrase-trained detector is injected.
pub struct EnergyWakeDetector {
    threshold: f32,
    voiced_run: usize,
}

impl EnergyWakeDetector {
    /// Create a detector with the given sensitivity in `0.0..=1.0`
    #[must_use]
    pub fn new(sensitivity: f32) -> Self {
        Self { threshold: rms_threshold(sensitivity), voiced_run: 0 }
    }
}

impl WakeWordDetector for EnergyWakeDetector {
    fn sample_rate(&self) -> u32 {
        MODEL_SAMPLE_RATE
    }

    fn frame_length(&self) -> usize {
        DETECTOR_FRAME
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        if frame_energy(frame) > self.threshold {
            self.voiced_run += 1;
            if self.voiced_run >= WAKE_VOICED_FRAMES {
                self.voiced_run = 0;
                return Ok(Some(0));
            }
        } else {
            self.voiced_run = 0;
        }
        Ok(None)
    }
}

/// Voice-activity-only recognizer.
///
/// Reports a placeholder partial while energy stays above the threshold and
/// closes each voiced run with an empty final, so endpointing behaves exactly
/// as with a real engine — the transcript is just always empty. Startup logs
/// make the limitation loud.
pub struct VadRecognizer {
    threshold: f32,
    voiced: bool,
}

impl VadRecognizer {
    /// Create a recognizer with the given sensitivity in `0.0..=1.0`
    #[must_use]
    pub fn new(sensitivity: f32) -> Self {
        Self { threshold: rms_threshold(sensitivity), voiced: false }
    }
}

impl StreamingRecognizer for VadRecognizer {
    fn accept_frame(&mut self, pcm: &[i16]) -> Result<Transcription> {
        let active = frame_energy(pcm) > self.threshold;

        if active {
            self.voiced = true;
            return Ok(Transcription::Partial("...".to_string()));
        }
        if self.voiced {
            self.voiced = false;
            return Ok(Transcription::Final(String::new()));
        }
        Ok(Transcription::None)
    }

    fn reset(&mut self) {
        self.voiced = false;
    }
}

/// Synthesizer backed by an external TTS command.
///
/// The command receives the text on stdin and must stream raw s16le mono PCM
/// on stdout (piper's `--output-raw` convention). Chunks surface lazily as
/// the process produces them.
pub struct ProcessSynthesizer {
    command: String,
    args: Vec<String>,
    sample_rate: u32,
}

impl ProcessSynthesizer {
    /// Create a synthesizer spawning `command` with `args` per utterance
    #[must_use]
    pub fn new(command: String, args: Vec<String>, sample_rate: u32) -> Self {
        Self { command, args, sample_rate }
    }

    /// Piper-style invocation: `command --model <path> --output-raw`
    #[must_use]
    pub fn piper_style(command: String, model_path: &str, sample_rate: u32) -> Self {
        let mut args = Vec::new();
        if !model_path.is_empty() {
            args.push("--model".to_string());
            args.push(model_path.to_string());
        }
        args.push("--output-raw".to_string());
        Self::new(command, args, sample_rate)
    }
}

impl SpeechSynthesizer for ProcessSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<ChunkStream> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Tts(format!("failed to spawn {}: {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"))
                .map_err(|e| Error::Tts(format!("failed to send text to TTS: {e}")))?;
            // Dropping stdin closes the pipe so the command can finish.
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Tts("TTS process has no stdout".to_string()))?;

        Ok(Box::new(PcmStdout {
            child,
            stdout,
            sample_rate: self.sample_rate,
            carry: None,
            done: false,
        }))
    }
}

/// Lazy chunk reader over a child process's raw PCM stdout
struct PcmStdout {
    child: Child,
    stdout: ChildStdout,
    sample_rate: u32,
    /// Dangling low byte when a read splits an i16 sample
    carry: Option<u8>,
    done: bool,
}

impl Iterator for PcmStdout {
    type Item = Result<AudioChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = [0_u8; TTS_READ_BYTES];
        let mut filled = 0;
        if let Some(low) = self.carry.take() {
            buf[0] = low;
            filled = 1;
        }

        match self.stdout.read(&mut buf[filled..]) {
            Ok(0) => {
                self.done = true;
                match self.child.wait() {
                    Ok(status) if !status.success() => {
                        Some(Err(Error::Tts(format!("TTS process exited with {status}"))))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(Error::Tts(format!("TTS process wait failed: {e}")))),
                }
            }
            Ok(n) => {
                filled += n;
                if filled % 2 == 1 {
                    self.carry = Some(buf[filled - 1]);
                    filled -= 1;
                }

                let samples: Vec<f32> = buf[..filled]
                    .chunks_exact(2)
                    .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
                    .collect();

                Some(Ok(AudioChunk { samples, sample_rate: self.sample_rate }))
            }
            Err(e) => {
                self.done = true;
                let _ = self.child.kill();
                let _ = self.child.wait();
                Some(Err(Error::Tts(format!("TTS read failed: {e}"))))
            }
        }
    }
}

impl Drop for PcmStdout {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Assemble the built-in engines for the configured voice settings
#[must_use]
pub fn engines_from_config(config: &VoiceConfig) -> VoiceEngines {
    tracing::warn!(
        wake_word = %config.wake_word,
        "no model-backed speech engines bundled: wake detection is energy-based \
         and transcripts will be empty until a recognizer is injected"
    );

    VoiceEngines {
        detector: Box::new(EnergyWakeDetector::new(config.sensitivity)),
        recognizer: Box::new(VadRecognizer::new(config.sensitivity)),
        synthesizer: Box::new(ProcessSynthesizer::piper_style(
            config.tts_command.clone(),
            &config.tts_model_path,
            config.tts_rate,
        )),
    }
}
