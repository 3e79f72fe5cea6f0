//! Shared test utilities
//!
//! Hardware-free fakes for the speech engine and sound device contracts, so
//! the voice pipeline can be driven end to end inside a test.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use vox_gateway::Result;
use vox_gateway::audio::SoundIo;
use vox_gateway::voice::{
    AudioChunk, ChunkStream, SpeechSynthesizer, StreamingRecognizer, Transcription,
    WakeWordDetector,
};

/// Detector that matches on the nth processed frame (1-based); never matches
/// again afterwards
pub struct ScriptedDetector {
    frames_seen: usize,
    match_on: usize,
}

impl ScriptedDetector {
    #[must_use]
    pub fn match_on(frame: usize) -> Self {
        Self { frames_seen: 0, match_on: frame }
    }

    /// A detector that never fires
    #[must_use]
    pub fn never() -> Self {
        Self::match_on(0)
    }
}

impl WakeWordDetector for ScriptedDetector {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn frame_length(&self) -> usize {
        512
    }

    fn process(&mut self, _frame: &[i16]) -> Result<Option<usize>> {
        self.frames_seen += 1;
        Ok((self.frames_seen == self.match_on).then_some(0))
    }
}

/// Shared handle feeding a [`StreamingRecognizer`] from the test body
#[derive(Clone, Default)]
pub struct RecognizerScript {
    events: Arc<Mutex<VecDeque<Transcription>>>,
}

impl RecognizerScript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for a future `accept_frame` call
    pub fn push(&self, event: Transcription) {
        self.events.lock().unwrap().push_back(event);
    }

    /// Recognizer end of the script; frames with no queued event decode to
    /// `Transcription::None`
    #[must_use]
    pub fn recognizer(&self) -> Box<dyn StreamingRecognizer> {
        Box::new(SharedRecognizer { events: Arc::clone(&self.events) })
    }
}

struct SharedRecognizer {
    events: Arc<Mutex<VecDeque<Transcription>>>,
}

impl StreamingRecognizer for SharedRecognizer {
    fn accept_frame(&mut self, _pcm: &[i16]) -> Result<Transcription> {
        Ok(self.events.lock().unwrap().pop_front().unwrap_or(Transcription::None))
    }

    fn reset(&mut self) {}
}

/// Recognizer that fails on every frame
pub struct FaultyRecognizer;

impl StreamingRecognizer for FaultyRecognizer {
    fn accept_frame(&mut self, _pcm: &[i16]) -> Result<Transcription> {
        Err(vox_gateway::Error::Stt("decoder crashed".to_string()))
    }

    fn reset(&mut self) {}
}

/// Synthesizer returning pre-scripted chunks per utterance text
pub struct ScriptedSynthesizer {
    scripts: Vec<(String, Vec<AudioChunk>)>,
}

impl ScriptedSynthesizer {
    #[must_use]
    pub fn new(scripts: Vec<(String, Vec<AudioChunk>)>) -> Self {
        Self { scripts }
    }
}

impl SpeechSynthesizer for ScriptedSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<ChunkStream> {
        let chunks = self
            .scripts
            .iter()
            .find(|(t, _)| t == text)
            .map(|(_, chunks)| chunks.clone())
            .unwrap_or_default();

        Ok(Box::new(chunks.into_iter().map(Ok)))
    }
}

/// In-memory [`SoundIo`]: records every `play_chunks` call with its chunk
/// sequence intact
pub struct MemorySoundIo {
    input_rate: u32,
    output_rate: u32,
    played: Mutex<Vec<Vec<Vec<f32>>>>,
}

impl MemorySoundIo {
    #[must_use]
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self { input_rate, output_rate, played: Mutex::new(Vec::new()) }
    }

    /// All playback calls so far, each with its ordered chunks
    #[must_use]
    pub fn played(&self) -> Vec<Vec<Vec<f32>>> {
        self.played.lock().unwrap().clone()
    }
}

impl SoundIo for MemorySoundIo {
    fn input_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn start_input(&self, _on_frame: Box<dyn FnMut(&[f32]) + Send>) -> Result<()> {
        Ok(())
    }

    fn stop_input(&self) {}

    fn play_chunks(&self, chunks: &mut dyn Iterator<Item = Vec<f32>>) -> Result<()> {
        let recorded: Vec<Vec<f32>> = chunks.collect();
        self.played.lock().unwrap().push(recorded);
        Ok(())
    }
}

/// A chunk with every sample set to `value`, tagged with `rate`
#[must_use]
pub fn chunk(value: f32, len: usize, rate: u32) -> AudioChunk {
    AudioChunk { samples: vec![value; len], sample_rate: rate }
}

/// One capture callback's worth of silence at 48 kHz
#[must_use]
pub fn capture_frame() -> Vec<f32> {
    vec![0.0; 1024]
}
