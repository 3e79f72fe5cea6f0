//! Capture-side composition
//!
//! Everything that runs inside the audio callback: rate conversion from the
//! device rate to the model rate, wake gating while idle, and frame feeding
//! while listening. Nothing here blocks on I/O; finished wake utterances
//! leave through a channel and chime playback is a non-blocking enqueue.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::Result;
use crate::audio::{StreamResampler, f32_to_i16};
use crate::voice::{
    ListenMode, RecognitionSession, SessionState, SpeakerHandle, WakeGate, WakeWordDetector,
};

/// Audio-thread half of the gateway
pub struct VoicePipeline {
    resampler: StreamResampler,
    gate: WakeGate,
    session: Arc<RecognitionSession>,
    speaker: SpeakerHandle,
    utterances: mpsc::UnboundedSender<String>,
}

impl VoicePipeline {
    /// Assemble the pipeline for a device capture rate.
    ///
    /// # Errors
    ///
    /// Returns error if the capture rate cannot be converted to the
    /// detector's model rate
    pub fn new(
        detector: Box<dyn WakeWordDetector>,
        session: Arc<RecognitionSession>,
        speaker: SpeakerHandle,
        utterances: mpsc::UnboundedSender<String>,
        input_rate: u32,
    ) -> Result<Self> {
        let gate = WakeGate::new(detector);
        let resampler = StreamResampler::new(input_rate, gate.sample_rate())?;

        Ok(Self { resampler, gate, session, speaker, utterances })
    }

    /// Handle one capture callback's samples. Called on the audio thread;
    /// must never block.
    pub fn process(&mut self, frame: &[f32]) {
        let converted = match self.resampler.process(frame) {
            Ok(converted) => converted,
            Err(e) => {
                tracing::error!(error = %e, "capture resample failed, dropping frame");
                return;
            }
        };
        if converted.is_empty() {
            return;
        }
        let pcm = f32_to_i16(&converted);

        match self.session.state() {
            SessionState::Idle => {
                if self.session.force_requested() {
                    self.gate.clear();
                    self.session.begin(ListenMode::Force);
                    return;
                }

                match self.gate.push(&pcm) {
                    Ok(Some(keyword)) => {
                        tracing::info!(keyword, "wake word detected");
                        self.speaker.chime();
                        self.session.begin(ListenMode::Wake);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "wake detector failed"),
                }
            }
            SessionState::WakeListen | SessionState::ForceListen => {
                if let Some(done) = self.session.feed(&pcm) {
                    // Forced results were already delivered through the
                    // pending listen; only wake utterances travel onward.
                    if done.mode == ListenMode::Wake && self.utterances.send(done.text).is_err() {
                        tracing::warn!("utterance channel closed, wake result dropped");
                    }
                }
            }
        }
    }
}
