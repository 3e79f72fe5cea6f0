//! Audio hardware and sample-rate plumbing
//!
//! The capture side delivers fixed-format frames on the device's own thread;
//! the playback side accepts an ordered sequence of chunks and blocks until
//! they are written. Everything in between (wake gating, recognition,
//! synthesis) lives in [`crate::voice`].

mod device;
mod resample;

pub use device::{DeviceSoundIo, SoundIo, samples_to_wav};
pub use resample::{StreamResampler, f32_to_i16, i16_to_f32, resample_mono};
