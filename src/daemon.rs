//! Daemon - the gateway service
//!
//! Wiring only: capture frames flow into the voice pipeline, finalized wake
//! utterances flow out to the bus as `input` events, and inbound `say`/`ask`
//! events reach the speaker and the recognition session through
//! [`GatewayHandler`]. No wired call failure is allowed to take down the
//! audio thread.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{DeviceSoundIo, SoundIo};
use crate::dialog::{DialogHandler, NatsDialog};
use crate::voice::{RecognitionSession, Speaker, SpeakerHandle, VoiceEngines, VoicePipeline};
use crate::{Config, Result};

/// The vox daemon - bridges audio hardware and the dialog backend
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until interrupted, using the host's audio devices.
    ///
    /// # Errors
    ///
    /// Returns error if startup fails; runtime faults are logged and
    /// survived instead
    pub async fn run(self, engines: VoiceEngines) -> Result<()> {
        let sound: Arc<dyn SoundIo> = Arc::new(DeviceSoundIo::new(self.config.audio.clone()));
        self.run_with(engines, sound).await
    }

    /// Run against an explicit [`SoundIo`] implementation
    ///
    /// # Errors
    ///
    /// Returns error if startup fails
    pub async fn run_with(self, engines: VoiceEngines, sound: Arc<dyn SoundIo>) -> Result<()> {
        let session = Arc::new(RecognitionSession::new(
            engines.recognizer,
            self.config.voice.first_silence_timeout,
            self.config.voice.silence_timeout,
        ));

        let speaker = Speaker::spawn(engines.synthesizer, Arc::clone(&sound))?;

        let (utterance_tx, mut utterance_rx) = mpsc::unbounded_channel();
        let mut pipeline = VoicePipeline::new(
            engines.detector,
            Arc::clone(&session),
            speaker.handle(),
            utterance_tx,
            sound.input_rate(),
        )?;

        let dialog = Arc::new(NatsDialog::new(
            self.config.bus.url.clone(),
            self.config.bus.source.clone(),
        ));
        let handler = Arc::new(GatewayHandler::new(speaker.handle(), Arc::clone(&session)));
        dialog.start(handler).await?;

        sound.start_input(Box::new(move |frame| pipeline.process(frame)))?;

        tracing::info!(
            wake_word = %self.config.voice.wake_word,
            source = %self.config.bus.source,
            "vox gateway ready"
        );

        // Set up shutdown signal
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                utterance = utterance_rx.recv() => {
                    match utterance {
                        Some(text) => {
                            if let Err(e) = dialog.publish_input(&text).await {
                                tracing::error!(error = %e, "input publish failed");
                            }
                        }
                        None => {
                            tracing::warn!("capture pipeline gone");
                            break;
                        }
                    }
                }
            }
        }

        // Orderly shutdown: stop capture first so no new episodes start,
        // stop the bus, then let queued speech finish.
        sound.stop_input();
        dialog.close().await;
        tokio::task::spawn_blocking(move || speaker.shutdown())
            .await
            .map_err(|e| crate::Error::Tts(format!("speaker shutdown join failed: {e}")))?;

        Ok(())
    }
}

/// Maps inbound dialog events onto the speaker and the recognition session
pub struct GatewayHandler {
    speaker: SpeakerHandle,
    session: Arc<RecognitionSession>,
}

impl GatewayHandler {
    /// Wire a handler to its session collaborators
    #[must_use]
    pub const fn new(speaker: SpeakerHandle, session: Arc<RecognitionSession>) -> Self {
        Self { speaker, session }
    }
}

#[async_trait]
impl DialogHandler for GatewayHandler {
    async fn handle_say(&self, text: &str) -> Result<()> {
        self.speaker.speak(text);
        Ok(())
    }

    async fn handle_ask(&self, text: &str) -> Result<String> {
        // Speak the prompt (fire-and-forget queue) and listen for the
        // answer; a concurrent ask queues on the session's listen gate.
        self.speaker.speak(text);
        self.session.listen_once().await
    }
}
