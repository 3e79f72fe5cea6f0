//! Sequential speech-synthesis playback
//!
//! One worker thread owns the synthesizer and the output stream. `speak` is
//! a non-blocking enqueue; the worker plays utterances strictly in request
//! order, one at a time, and each utterance's chunks in sequence. Blocking
//! playback writes therefore never run on the async runtime.

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::audio::{SoundIo, resample_mono};
use crate::voice::SpeechSynthesizer;
use crate::{Error, Result};

enum Job {
    Utterance(String),
    Chime,
    Shutdown,
}

/// Cloneable enqueue side of the speaker
#[derive(Clone)]
pub struct SpeakerHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl SpeakerHandle {
    /// Queue an utterance; returns immediately. Dropped with a warning if
    /// the worker has shut down.
    pub fn speak(&self, text: &str) {
        if self.tx.send(Job::Utterance(text.to_string())).is_err() {
            tracing::warn!("speaker worker gone, utterance dropped");
        }
    }

    /// Queue the wake acknowledgment chime
    pub fn chime(&self) {
        let _ = self.tx.send(Job::Chime);
    }
}

/// Owns the playback worker thread
pub struct Speaker {
    tx: mpsc::UnboundedSender<Job>,
    worker: Option<JoinHandle<()>>,
}

impl Speaker {
    /// Start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn(
        mut synthesizer: Box<dyn SpeechSynthesizer>,
        sound: Arc<dyn SoundIo>,
    ) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = std::thread::Builder::new()
            .name("vox-speaker".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    match job {
                        Job::Utterance(text) => {
                            play_utterance(synthesizer.as_mut(), sound.as_ref(), &text);
                        }
                        Job::Chime => play_chime(sound.as_ref()),
                        Job::Shutdown => break,
                    }
                }
                tracing::debug!("speaker worker stopped");
            })
            .map_err(|e| Error::Tts(format!("speaker thread spawn failed: {e}")))?;

        Ok(Self { tx, worker: Some(worker) })
    }

    /// Enqueue side for the pipeline and dialog handler
    #[must_use]
    pub fn handle(&self) -> SpeakerHandle {
        SpeakerHandle { tx: self.tx.clone() }
    }

    /// Play everything queued so far, then stop the worker.
    ///
    /// Completion policy: utterances enqueued before this call finish;
    /// anything enqueued afterwards is dropped.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn play_utterance(synthesizer: &mut dyn SpeechSynthesizer, sound: &dyn SoundIo, text: &str) {
    tracing::info!(text = %text, "speaking");

    let stream = match synthesizer.synthesize(text) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "synthesis failed");
            return;
        }
    };

    let out_rate = sound.output_rate();

    // Empty chunks are skipped; a chunk error truncates the utterance but
    // never tears down the worker.
    let mut chunks = stream
        .scan(false, move |failed, item| {
            if *failed {
                return None;
            }
            match item {
                Ok(chunk) if chunk.samples.is_empty() => Some(None),
                Ok(chunk) => match resample_mono(&chunk.samples, chunk.sample_rate, out_rate) {
                    Ok(samples) => Some(Some(samples)),
                    Err(e) => {
                        tracing::error!(error = %e, "chunk resample failed, truncating utterance");
                        *failed = true;
                        None
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "synthesis chunk failed, truncating utterance");
                    *failed = true;
                    None
                }
            }
        })
        .flatten();

    if let Err(e) = sound.play_chunks(&mut chunks) {
        tracing::error!(error = %e, "playback failed");
    }
}

fn play_chime(sound: &dyn SoundIo) {
    let samples = chime_samples(sound.output_rate());
    let mut chunks = std::iter::once(samples);
    if let Err(e) = sound.play_chunks(&mut chunks) {
        tracing::error!(error = %e, "chime playback failed");
    }
}

/// Two-tone decaying wake acknowledgment, with short fades against clicks
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn chime_samples(sample_rate: u32) -> Vec<f32> {
    use std::f32::consts::TAU;

    let duration = 0.6_f32;
    let len = (sample_rate as f32 * duration) as usize;
    let fade = (sample_rate as f32 * 0.01) as usize;

    let mut samples: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let tone = 0.15 * (TAU * 1200.0 * t).sin() + 0.15 * (TAU * 1500.0 * t).sin();
            tone * (-5.0 * t).exp()
        })
        .collect();

    for i in 0..fade.min(samples.len()) {
        let gain = i as f32 / fade as f32;
        samples[i] *= gain;
        let end = samples.len() - 1 - i;
        samples[end] *= gain;
    }

    samples
}
