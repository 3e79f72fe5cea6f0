//! Recognition session state machine
//!
//! Owns the listening state, the streaming recognizer, and the endpoint
//! deadline. Frames arrive on the audio thread; `listen_once` suspends a
//! tokio task until the audio-thread side finalizes an episode. The
//! recognizer and state share one lock, held only for the duration of a
//! frame step — never across playback or bus I/O.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::voice::{StreamingRecognizer, Transcription};
use crate::{Error, Result};

/// Listening state; exactly one instance, owned by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not listening; wake detection is active
    Idle,

    /// Listening after a wake event; result goes to the wake-utterance path
    WakeListen,

    /// Listening on behalf of a pending `listen_once`
    ForceListen,
}

/// How a listening episode was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// Triggered by wake word detection
    Wake,

    /// Triggered by `listen_once`
    Force,
}

/// A completed listening episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedUtterance {
    /// How the episode started
    pub mode: ListenMode,

    /// Finalized text; empty when the episode timed out without speech
    pub text: String,
}

struct Inner {
    recognizer: Box<dyn StreamingRecognizer>,
    state: SessionState,
    text: String,
    deadline: Option<Instant>,
    pending: Option<oneshot::Sender<String>>,
}

/// The audio-session state machine
pub struct RecognitionSession {
    inner: Mutex<Inner>,

    /// Set by `listen_once`; the audio thread begins a forced episode from
    /// Idle on the next frame and clears it
    force: AtomicBool,

    /// Serializes `listen_once` callers: a second ask queues here instead of
    /// sharing the single listening episode
    listen_gate: tokio::sync::Mutex<()>,

    first_silence_timeout: Duration,
    silence_timeout: Duration,
}

impl RecognitionSession {
    /// Create a session around a recognizer.
    ///
    /// `first_silence_timeout` bounds how long the user may take to begin
    /// speaking after a trigger; `silence_timeout` ends the utterance once
    /// speech has started.
    #[must_use]
    pub fn new(
        recognizer: Box<dyn StreamingRecognizer>,
        first_silence_timeout: Duration,
        silence_timeout: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                recognizer,
                state: SessionState::Idle,
                text: String::new(),
                deadline: None,
                pending: None,
            }),
            force: AtomicBool::new(false),
            listen_gate: tokio::sync::Mutex::new(()),
            first_silence_timeout,
            silence_timeout,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Whether a `listen_once` caller is waiting for an episode to start
    pub fn force_requested(&self) -> bool {
        self.force.load(Ordering::Acquire)
    }

    /// Enter a listening state. Resets the recognizer, clears accumulated
    /// text, and arms the endpoint deadline atomically with the state change.
    pub fn begin(&self, mode: ListenMode) {
        let mut inner = self.lock();
        inner.recognizer.reset();
        inner.text.clear();
        inner.deadline = Some(Instant::now() + self.first_silence_timeout);
        inner.state = match mode {
            ListenMode::Wake => SessionState::WakeListen,
            ListenMode::Force => {
                self.force.store(false, Ordering::Release);
                SessionState::ForceListen
            }
        };

        tracing::info!(state = ?inner.state, "listening started");
    }

    /// Feed one frame at the model rate while listening.
    ///
    /// Recognizer finals are appended to the utterance (comma-joined) and
    /// push the deadline forward; non-empty partials also push it — voice
    /// activity counts, not just finalization. When the deadline passes the
    /// episode finalizes: a `Force` result is delivered to the pending
    /// `listen_once`, and the utterance is returned to the caller either way.
    ///
    /// Returns `None` while the episode is still open, or when called in
    /// `Idle`.
    pub fn feed(&self, frame: &[i16]) -> Option<FinishedUtterance> {
        let mut inner = self.lock();
        if inner.state == SessionState::Idle {
            return None;
        }

        match inner.recognizer.accept_frame(frame) {
            Ok(Transcription::Final(segment)) => {
                if !segment.is_empty() {
                    if inner.text.is_empty() {
                        inner.text = segment;
                    } else {
                        inner.text.push_str(", ");
                        inner.text.push_str(&segment);
                    }
                }
                inner.deadline = Some(Instant::now() + self.silence_timeout);
            }
            Ok(Transcription::Partial(partial)) if !partial.is_empty() => {
                inner.deadline = Some(Instant::now() + self.silence_timeout);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "recognizer failed; abandoning episode");
                Self::abandon(&mut inner);
                return None;
            }
        }

        // Advisory timeout: checked per frame, so endpointing resolution is
        // bounded by the audio frame period.
        let expired = inner.deadline.is_some_and(|d| Instant::now() >= d);
        if !expired {
            return None;
        }

        Some(Self::finalize(&mut inner))
    }

    /// Force a listening episode and wait for its text.
    ///
    /// Serialized: a concurrent caller queues until the first round-trip
    /// completes. The next episode begins on the first frame after the
    /// session returns to `Idle`, so a wake episode already in flight
    /// finishes first.
    ///
    /// # Errors
    ///
    /// Returns error if the episode is abandoned (recognizer fault) before
    /// any result is delivered
    pub async fn listen_once(&self) -> Result<String> {
        let _gate = self.listen_gate.lock().await;

        let (tx, rx) = oneshot::channel();
        self.lock().pending = Some(tx);
        self.force.store(true, Ordering::Release);
        tracing::debug!("force listen requested");

        rx.await
            .map_err(|_| Error::Session("listening episode abandoned before completion".to_string()))
    }

    fn finalize(inner: &mut Inner) -> FinishedUtterance {
        let text = finalize_text(&std::mem::take(&mut inner.text));
        let mode = match inner.state {
            SessionState::ForceListen => ListenMode::Force,
            _ => ListenMode::Wake,
        };

        inner.state = SessionState::Idle;
        inner.deadline = None;

        if mode == ListenMode::Force {
            match inner.pending.take() {
                Some(tx) => {
                    if tx.send(text.clone()).is_err() {
                        // The asker stopped caring; at-most-once, discard.
                        tracing::debug!("listen result dropped, receiver gone");
                    }
                }
                None => tracing::warn!("forced episode finished with no pending listener"),
            }
        }

        tracing::info!(?mode, text = %text, "utterance finalized");
        FinishedUtterance { mode, text }
    }

    /// Drop the current episode without emitting any result
    fn abandon(inner: &mut Inner) {
        inner.recognizer.reset();
        inner.text.clear();
        inner.deadline = None;
        inner.state = SessionState::Idle;
        // Dropping the sender fails the waiting listen_once.
        inner.pending = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Uppercase the first character and append a terminal period; empty text
/// stays empty
fn finalize_text(raw: &str) -> String {
    let mut chars = raw.chars();
    chars.next().map_or_else(String::new, |first| {
        let mut out: String = first.to_uppercase().collect();
        out.push_str(chars.as_str());
        out.push('.');
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedRecognizer {
        script: VecDeque<Transcription>,
        resets: usize,
    }

    impl ScriptedRecognizer {
        fn new(script: Vec<Transcription>) -> Self {
            Self { script: script.into(), resets: 0 }
        }
    }

    impl StreamingRecognizer for ScriptedRecognizer {
        fn accept_frame(&mut self, _pcm: &[i16]) -> Result<Transcription> {
            Ok(self.script.pop_front().unwrap_or(Transcription::None))
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn session(script: Vec<Transcription>) -> RecognitionSession {
        RecognitionSession::new(
            Box::new(ScriptedRecognizer::new(script)),
            Duration::from_millis(60),
            Duration::from_millis(30),
        )
    }

    #[test]
    fn idle_feed_is_ignored() {
        let s = session(vec![]);
        assert_eq!(s.feed(&[0; 160]), None);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn segments_join_and_capitalize() {
        let s = session(vec![
            Transcription::Final("hello".to_string()),
            Transcription::Final("world".to_string()),
        ]);
        s.begin(ListenMode::Wake);

        assert_eq!(s.feed(&[0; 160]), None);
        assert_eq!(s.feed(&[0; 160]), None);

        std::thread::sleep(Duration::from_millis(40));
        let done = s.feed(&[0; 160]).expect("deadline passed");
        assert_eq!(done.mode, ListenMode::Wake);
        assert_eq!(done.text, "Hello, world.");
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn empty_episode_delivers_empty_text() {
        let s = session(vec![]);
        s.begin(ListenMode::Wake);

        std::thread::sleep(Duration::from_millis(70));
        let done = s.feed(&[0; 160]).expect("first-silence deadline passed");
        assert_eq!(done.text, "");
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn partial_extends_deadline() {
        let s = session(vec![
            Transcription::Partial("he".to_string()),
            Transcription::None,
            Transcription::Final("hello".to_string()),
        ]);
        s.begin(ListenMode::Wake);

        // Partial at t=50 pushes the deadline past the first-silence window.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(s.feed(&[0; 160]), None);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(s.feed(&[0; 160]), None);
        assert_eq!(s.feed(&[0; 160]), None);

        std::thread::sleep(Duration::from_millis(40));
        let done = s.feed(&[0; 160]).expect("silence deadline passed");
        assert_eq!(done.text, "Hello.");
    }

    #[test]
    fn recognizer_fault_abandons_to_idle() {
        struct FailingRecognizer;
        impl StreamingRecognizer for FailingRecognizer {
            fn accept_frame(&mut self, _pcm: &[i16]) -> Result<Transcription> {
                Err(Error::Stt("decoder crashed".to_string()))
            }
            fn reset(&mut self) {}
        }

        let s = RecognitionSession::new(
            Box::new(FailingRecognizer),
            Duration::from_millis(60),
            Duration::from_millis(30),
        );
        s.begin(ListenMode::Wake);

        assert_eq!(s.feed(&[0; 160]), None);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn finalize_text_formats() {
        assert_eq!(finalize_text(""), "");
        assert_eq!(finalize_text("hello world"), "Hello world.");
        assert_eq!(finalize_text("a"), "A.");
    }
}
