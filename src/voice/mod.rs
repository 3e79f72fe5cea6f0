//! Voice processing
//!
//! The speech engines are collaborators behind narrow trait contracts:
//! wake-word detection, streaming recognition, and synthesis are all
//! injectable, and [`builtin`] ships reference implementations that run
//! without native model libraries. The modules here own everything between
//! the audio device and the dialog bridge: wake gating, the listening state
//! machine, and sequential synthesis playback.

pub mod builtin;
mod pipeline;
mod session;
mod speaker;
mod wake;

pub use pipeline::VoicePipeline;
pub use session::{FinishedUtterance, ListenMode, RecognitionSession, SessionState};
pub use speaker::{Speaker, SpeakerHandle};
pub use wake::WakeGate;

use crate::Result;

/// One synthesized audio chunk: mono float samples at a chunk-local rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono PCM in `[-1.0, 1.0]`
    pub samples: Vec<f32>,

    /// Sample rate of this chunk in Hz
    pub sample_rate: u32,
}

/// Incremental output of a streaming recognizer for one fed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcription {
    /// A stable segment the recognizer will not revise
    Final(String),

    /// An in-progress hypothesis; counts as voice activity when non-empty
    Partial(String),

    /// Nothing new decoded for this frame
    None,
}

/// Wake word detection over fixed-length frames.
///
/// Implementations are synchronous and cheap enough to run on the audio
/// thread. A detector consumes exactly [`WakeWordDetector::frame_length`]
/// samples at [`WakeWordDetector::sample_rate`] per call.
pub trait WakeWordDetector: Send {
    /// Required input sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Required frame length in samples
    fn frame_length(&self) -> usize;

    /// Process one frame; returns the matched keyword index on detection
    ///
    /// # Errors
    ///
    /// Returns error if the detector fails internally
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>>;
}

/// Streaming speech recognition.
///
/// Maintains internal buffering across frames; [`StreamingRecognizer::reset`]
/// discards it and starts a new utterance.
pub trait StreamingRecognizer: Send {
    /// Feed one mono PCM frame at the model sample rate
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails; the current episode is then abandoned
    fn accept_frame(&mut self, pcm: &[i16]) -> Result<Transcription>;

    /// Discard internal state and begin a new utterance
    fn reset(&mut self);
}

/// Speech synthesis producing a lazy, finite chunk sequence.
///
/// A returned sequence is not restartable; callers consume it exactly once.
pub trait SpeechSynthesizer: Send {
    /// Synthesize `text` into an ordered chunk sequence
    ///
    /// # Errors
    ///
    /// Returns error if synthesis cannot start; per-chunk failures surface
    /// through the iterator items
    fn synthesize(&mut self, text: &str) -> Result<ChunkStream>;
}

/// Lazy chunk sequence returned by [`SpeechSynthesizer::synthesize`]
pub type ChunkStream = Box<dyn Iterator<Item = Result<AudioChunk>> + Send>;

/// The pluggable speech engines, injected into the daemon at construction
pub struct VoiceEngines {
    /// Wake word detector
    pub detector: Box<dyn WakeWordDetector>,

    /// Streaming recognizer
    pub recognizer: Box<dyn StreamingRecognizer>,

    /// Speech synthesizer
    pub synthesizer: Box<dyn SpeechSynthesizer>,
}
