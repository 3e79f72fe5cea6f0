//! Vox Gateway - wake-word voice front-end for message-bus dialog backends
//!
//! Detects a wake phrase on live capture audio, streams the utterance that
//! follows into a recognizer with silence-driven endpointing, publishes the
//! finalized text to the bus, and speaks whatever the backend sends back -
//! either unsolicited (`say`) or as a blocking spoken prompt answered by the
//! next utterance (`ask`).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Audio device (cpal)                  │
//! │    capture callback thread   │   playback worker      │
//! └──────────────┬───────────────┴──────────▲────────────┘
//!                │                          │
//! ┌──────────────▼───────────────┐  ┌───────┴────────────┐
//! │        VoicePipeline          │  │      Speaker       │
//! │  resample → wake gate →       │  │  synth → resample  │
//! │  RecognitionSession           │  │  → ordered chunks  │
//! └──────────────┬───────────────┘  └───────▲────────────┘
//!                │ utterances               │ say / ask prompts
//! ┌──────────────▼──────────────────────────┴────────────┐
//! │             DialogBridge (NATS JetStream)             │
//! │   input / response out      │      say / ask in       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The speech engines (wake word, recognition, synthesis) are trait
//! collaborators; [`voice::builtin`] provides model-free reference
//! implementations so the binary runs out of the box.

pub mod audio;
pub mod config;
pub mod daemon;
pub mod dialog;
pub mod error;
pub mod voice;

pub use config::Config;
pub use daemon::{Daemon, GatewayHandler};
pub use error::{Error, Result};
