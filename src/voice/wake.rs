//! Wake word gating
//!
//! Accumulates capture audio into detector-sized frames. Between calls the
//! buffer holds strictly less than one detector frame, so memory stays
//! bounded; on a match any buffered remainder is discarded so the listening
//! episode starts fresh.

use crate::Result;
use crate::voice::WakeWordDetector;

/// Feeds fixed-length frames to a [`WakeWordDetector`]
pub struct WakeGate {
    detector: Box<dyn WakeWordDetector>,
    buffer: Vec<i16>,
}

impl WakeGate {
    /// Wrap a detector
    #[must_use]
    pub fn new(detector: Box<dyn WakeWordDetector>) -> Self {
        Self { detector, buffer: Vec::new() }
    }

    /// Sample rate the wrapped detector requires, in Hz
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.detector.sample_rate()
    }

    /// Append capture samples (already at the detector rate) and run the
    /// detector over every complete frame. Returns the matched keyword index
    /// on detection; buffered audio is discarded at that point.
    ///
    /// # Errors
    ///
    /// Returns error if the detector fails; the buffer is left intact
    pub fn push(&mut self, samples: &[i16]) -> Result<Option<usize>> {
        self.buffer.extend_from_slice(samples);

        let frame_len = self.detector.frame_length();
        while self.buffer.len() >= frame_len {
            let matched = self.detector.process(&self.buffer[..frame_len])?;
            self.buffer.drain(..frame_len);

            if let Some(index) = matched {
                self.buffer.clear();
                return Ok(Some(index));
            }
        }

        Ok(None)
    }

    /// Discard any buffered audio
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Samples currently buffered (always less than one detector frame
    /// after [`WakeGate::push`] returns)
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::WakeWordDetector;

    /// Matches on the nth processed frame
    struct NthFrameDetector {
        frames_seen: usize,
        match_on: usize,
    }

    impl WakeWordDetector for NthFrameDetector {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn frame_length(&self) -> usize {
            512
        }

        fn process(&mut self, frame: &[i16]) -> crate::Result<Option<usize>> {
            assert_eq!(frame.len(), 512);
            self.frames_seen += 1;
            Ok((self.frames_seen == self.match_on).then_some(0))
        }
    }

    #[test]
    fn buffers_partial_frames() {
        let mut gate = WakeGate::new(Box::new(NthFrameDetector { frames_seen: 0, match_on: usize::MAX }));

        assert_eq!(gate.push(&[0; 300]).unwrap(), None);
        assert_eq!(gate.buffered(), 300);

        // 600 total: one full frame consumed, 88 carried over
        assert_eq!(gate.push(&[0; 300]).unwrap(), None);
        assert_eq!(gate.buffered(), 88);
    }

    #[test]
    fn match_discards_buffered_audio() {
        let mut gate = WakeGate::new(Box::new(NthFrameDetector { frames_seen: 0, match_on: 2 }));

        // Three frames worth: the second frame matches, the third is discarded
        assert_eq!(gate.push(&[0; 1536]).unwrap(), Some(0));
        assert_eq!(gate.buffered(), 0);
    }
}
