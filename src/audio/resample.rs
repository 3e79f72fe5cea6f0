//! Band-limited sample-rate conversion
//!
//! Both conversion paths run through `rubato`'s FFT resampler rather than
//! linear interpolation, so down-sampling the 48 kHz capture stream to the
//! 16 kHz model space does not alias. The playback path converts one
//! synthesizer chunk at a time with [`resample_mono`]; the capture path keeps
//! a [`StreamResampler`] alive per pipeline because the device delivers
//! fixed-size callbacks that rarely line up with the resampler's chunk size.

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Internal processing chunk for the FFT resampler
const CHUNK: usize = 1024;

/// Sub-chunk count, trades latency for filter quality
const SUB_CHUNKS: usize = 2;

/// Resample a mono buffer from `from` Hz to `to` Hz.
///
/// Identity fast path: when `from == to` the input is returned unchanged.
/// The tail of the input is zero-padded up to the resampler chunk size, so
/// the output may carry a few milliseconds of trailing silence.
///
/// # Errors
///
/// Returns error if the resampler cannot be constructed for the rate pair
/// or fails mid-conversion
pub fn resample_mono(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to {
        return Ok(input.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK, SUB_CHUNKS, 1)
        .map_err(|e| Error::Resample(e.to_string()))?;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let expected = (input.len() as f64 * f64::from(to) / f64::from(from)).ceil() as usize;
    let mut out = Vec::with_capacity(expected + CHUNK);

    let mut pos = 0;
    while pos < input.len() {
        let end = (pos + CHUNK).min(input.len());
        let mut chunk = vec![0.0_f32; CHUNK];
        chunk[..end - pos].copy_from_slice(&input[pos..end]);

        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        out.extend_from_slice(&frames[0]);

        pos = end;
    }

    Ok(out)
}

/// Streaming resampler for the capture path.
///
/// Accumulates device callbacks into fixed chunks and emits converted audio
/// as it becomes available. Filter state is private to one pipeline and must
/// not be shared across streams.
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a converter from `from` Hz to `to` Hz.
    ///
    /// # Errors
    ///
    /// Returns error if the rate pair is unsupported
    pub fn new(from: u32, to: u32) -> Result<Self> {
        let inner = if from == to {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK, SUB_CHUNKS, 1)
                    .map_err(|e| Error::Resample(e.to_string()))?,
            )
        };

        Ok(Self { inner, pending: Vec::new() })
    }

    /// Feed one capture callback's samples, returning whatever converted
    /// audio completed. Output lags input by up to one internal chunk.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying resampler fails
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            // Identity fast path
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);

        let mut out = Vec::new();
        while self.pending.len() >= resampler.input_frames_next() {
            let take = resampler.input_frames_next();
            let chunk: Vec<f32> = self.pending.drain(..take).collect();

            let frames = resampler
                .process(&[chunk], None)
                .map_err(|e| Error::Resample(e.to_string()))?;
            out.extend_from_slice(&frames[0]);
        }

        Ok(out)
    }
}

/// Convert float samples to i16, saturating at the sample range bounds.
///
/// Clamping on overflow is intentional lossy behavior: a hot TTS chunk or a
/// resampler overshoot clips instead of failing the stream.
#[must_use]
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
            v
        })
        .collect()
}

/// Convert i16 samples to float in `[-1.0, 1.0]`
#[must_use]
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}
