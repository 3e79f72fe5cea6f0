//! Audio path integration tests
//!
//! Sequencer and conversion behavior without audio hardware.

use std::io::Cursor;
use std::sync::Arc;

use vox_gateway::audio::{SoundIo, resample_mono, samples_to_wav};
use vox_gateway::voice::Speaker;

mod common;

use common::{MemorySoundIo, ScriptedSynthesizer, chunk};

#[test]
fn speak_preserves_chunk_order_and_skips_empty() {
    let synth = ScriptedSynthesizer::new(vec![(
        "alpha".to_string(),
        vec![chunk(0.1, 3, 44_100), chunk(0.0, 0, 44_100), chunk(0.2, 2, 44_100)],
    )]);
    let sound = Arc::new(MemorySoundIo::new(48_000, 44_100));

    let speaker = Speaker::spawn(Box::new(synth), Arc::clone(&sound) as Arc<dyn SoundIo>).unwrap();
    speaker.handle().speak("alpha");
    speaker.shutdown();

    // One playback call, both non-empty chunks in order, the empty one gone.
    let played = sound.played();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0], vec![vec![0.1; 3], vec![0.2; 2]]);
}

#[test]
fn queued_utterances_never_interleave() {
    let synth = ScriptedSynthesizer::new(vec![
        ("alpha".to_string(), vec![chunk(0.1, 4, 44_100)]),
        ("beta".to_string(), vec![chunk(0.2, 4, 44_100)]),
    ]);
    let sound = Arc::new(MemorySoundIo::new(48_000, 44_100));

    let speaker = Speaker::spawn(Box::new(synth), Arc::clone(&sound) as Arc<dyn SoundIo>).unwrap();
    let handle = speaker.handle();
    handle.speak("alpha");
    handle.speak("beta");
    speaker.shutdown();

    let played = sound.played();
    assert_eq!(played.len(), 2);
    assert_eq!(played[0], vec![vec![0.1; 4]]);
    assert_eq!(played[1], vec![vec![0.2; 4]]);
}

#[test]
fn chunks_are_resampled_to_the_device_rate() {
    // A full resampler chunk at 22.05 kHz roughly doubles at 44.1 kHz.
    let synth =
        ScriptedSynthesizer::new(vec![("alpha".to_string(), vec![chunk(0.3, 1024, 22_050)])]);
    let sound = Arc::new(MemorySoundIo::new(48_000, 44_100));

    let speaker = Speaker::spawn(Box::new(synth), Arc::clone(&sound) as Arc<dyn SoundIo>).unwrap();
    speaker.handle().speak("alpha");
    speaker.shutdown();

    let played = sound.played();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].len(), 1);

    let out_len = played[0][0].len();
    assert!((1900..=2200).contains(&out_len), "unexpected output length {out_len}");
}

#[test]
fn resample_identity_matches_bit_for_bit() {
    let input: Vec<f32> = (0..1000).map(|i| f32::from(i16::try_from(i).unwrap()) / 32768.0).collect();
    assert_eq!(resample_mono(&input, 44_100, 44_100).unwrap(), input);
}

#[test]
fn wav_dump_round_trips_through_hound() {
    let samples = vec![0.0_f32, 0.5, -0.5, 1.0];
    let wav = samples_to_wav(&samples, 16_000).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 1);

    let decoded: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(decoded.len(), samples.len());
    assert_eq!(decoded[0], 0);
    assert_eq!(decoded[3], 32767);
}

#[test]
fn memory_sound_io_reports_configured_rates() {
    let sound = MemorySoundIo::new(48_000, 44_100);
    assert_eq!(sound.input_rate(), 48_000);
    assert_eq!(sound.output_rate(), 44_100);
}
