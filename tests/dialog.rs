//! Dialog bridge integration tests
//!
//! Handler behavior and wire shape; the JetStream transport itself needs a
//! live server and is exercised against its declared contracts instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use vox_gateway::GatewayHandler;
use vox_gateway::audio::SoundIo;
use vox_gateway::dialog::{DialogHandler, DialogPayload, EventKind, PUB_ROOT, SUB_ROOT, parse_subject, subject};
use vox_gateway::voice::{RecognitionSession, Speaker, VoicePipeline};

mod common;

use common::{
    FaultyRecognizer, MemorySoundIo, RecognizerScript, ScriptedDetector, ScriptedSynthesizer,
    capture_frame, chunk,
};

#[tokio::test(flavor = "multi_thread")]
async fn say_goes_straight_to_playback() {
    let synth = ScriptedSynthesizer::new(vec![("Good morning.".to_string(), vec![chunk(0.4, 6, 44_100)])]);
    let sound = Arc::new(MemorySoundIo::new(48_000, 44_100));
    let speaker = Speaker::spawn(Box::new(synth), Arc::clone(&sound) as Arc<dyn SoundIo>).unwrap();

    let script = RecognizerScript::new();
    let session = Arc::new(RecognitionSession::new(
        script.recognizer(),
        Duration::from_millis(500),
        Duration::from_millis(100),
    ));

    let handler = GatewayHandler::new(speaker.handle(), session);
    handler.handle_say("Good morning.").await.unwrap();

    tokio::task::spawn_blocking(move || speaker.shutdown()).await.unwrap();
    assert_eq!(sound.played(), vec![vec![vec![0.4; 6]]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn abandoned_episode_fails_the_ask() {
    let sound = Arc::new(MemorySoundIo::new(48_000, 44_100));
    let speaker =
        Speaker::spawn(Box::new(ScriptedSynthesizer::new(vec![])), Arc::clone(&sound) as Arc<dyn SoundIo>).unwrap();

    let session = Arc::new(RecognitionSession::new(
        Box::new(FaultyRecognizer),
        Duration::from_millis(500),
        Duration::from_millis(100),
    ));

    let (tx, _utterances) = mpsc::unbounded_channel();
    let mut pipeline = VoicePipeline::new(
        Box::new(ScriptedDetector::never()),
        Arc::clone(&session),
        speaker.handle(),
        tx,
        48_000,
    )
    .unwrap();

    let handler = Arc::new(GatewayHandler::new(speaker.handle(), Arc::clone(&session)));
    let ask = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move { handler.handle_ask("Still there?").await }
    });

    // Wait for the force request, start the episode, then let the faulty
    // recognizer abandon it on the first fed frame.
    for _ in 0..200 {
        if session.force_requested() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    pipeline.process(&capture_frame());
    pipeline.process(&capture_frame());

    assert!(ask.await.unwrap().is_err());
    assert_eq!(session.state(), vox_gateway::voice::SessionState::Idle);
    tokio::task::spawn_blocking(move || speaker.shutdown()).await.unwrap();
}

#[test]
fn wire_scheme_matches_the_protocol() {
    // Outbound: <PUB-ROOT>.<event>.<source>
    assert_eq!(subject(PUB_ROOT, EventKind::Input, "assistant"), "raw_text.input.assistant");
    assert_eq!(
        subject(PUB_ROOT, EventKind::Response, "assistant"),
        "raw_text.response.assistant"
    );

    // Inbound events arrive under the subscription root.
    assert_eq!(parse_subject(&subject(SUB_ROOT, EventKind::Say, "assistant")), Some(EventKind::Say));
    assert_eq!(parse_subject(&subject(SUB_ROOT, EventKind::Ask, "assistant")), Some(EventKind::Ask));

    // Payloads keep the fixed session id.
    let payload = DialogPayload { session_id: 0, text: "Hello".to_string() };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["session_id"], 0);
    assert_eq!(json["text"], "Hello");
}
