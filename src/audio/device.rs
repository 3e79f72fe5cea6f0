//! Audio device access via cpal
//!
//! Capture hands fixed-format mono frames to a callback on a dedicated
//! thread; playback writes chunk sequences with blocking back-pressure.
//! Both sides are modeled behind the [`SoundIo`] trait so the voice pipeline
//! can be exercised without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};

use crate::config::AudioConfig;
use crate::{Error, Result};

/// Playback queue high-water mark in seconds of audio; the writer stalls
/// while more than this is still queued, so one utterance cannot buffer
/// unboundedly ahead of the speaker.
const QUEUE_HIGH_WATER_SECS: f32 = 0.5;

/// Audio device capability contract.
///
/// Capture delivers mono f32 frames at [`SoundIo::input_rate`] on the
/// device's own thread; the callback must not block on I/O. Playback accepts
/// an ordered chunk sequence at [`SoundIo::output_rate`] and returns only
/// once every chunk has been written.
pub trait SoundIo: Send + Sync {
    /// Capture sample rate in Hz
    fn input_rate(&self) -> u32;

    /// Playback sample rate in Hz
    fn output_rate(&self) -> u32;

    /// Start the capture stream, delivering frames to `on_frame`
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened or the stream fails to
    /// start
    fn start_input(&self, on_frame: Box<dyn FnMut(&[f32]) + Send>) -> Result<()>;

    /// Stop the capture stream; a no-op when not capturing
    fn stop_input(&self);

    /// Write chunks to the output stream strictly in order, blocking until
    /// the last sample has been queued to the device and drained
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    fn play_chunks(&self, chunks: &mut dyn Iterator<Item = Vec<f32>>) -> Result<()>;
}

struct CaptureCtl {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// [`SoundIo`] backed by the host's audio devices
pub struct DeviceSoundIo {
    config: AudioConfig,
    capture: Mutex<Option<CaptureCtl>>,
}

impl DeviceSoundIo {
    /// Create a sound I/O handle for the configured devices.
    ///
    /// Device lookup is deferred to stream start so a device that appears
    /// later (or is re-plugged) is picked up on the next start.
    #[must_use]
    pub fn new(config: AudioConfig) -> Self {
        Self { config, capture: Mutex::new(None) }
    }
}

impl SoundIo for DeviceSoundIo {
    fn input_rate(&self) -> u32 {
        self.config.input_rate
    }

    fn output_rate(&self) -> u32 {
        self.config.output_rate
    }

    fn start_input(&self, mut on_frame: Box<dyn FnMut(&[f32]) + Send>) -> Result<()> {
        let mut guard = self.capture.lock().map_err(|_| poisoned())?;
        if guard.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let device_name = self.config.input_device.clone();
        let rate = self.config.input_rate;

        // cpal streams are not Send, so the stream lives entirely on this
        // thread; startup success or failure is reported back once.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let handle = std::thread::Builder::new()
            .name("vox-capture".to_string())
            .spawn(move || {
                let (target, channels) = match open_input_stream(device_name.as_deref(), rate) {
                    Ok(ok) => ok,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let stream = match build_input(&target, channels, &mut on_frame) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));
                tracing::debug!("audio capture started");

                while !stop_flag.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(50));
                }

                drop(stream);
                tracing::debug!("audio capture stopped");
            })
            .map_err(|e| Error::Audio(format!("capture thread spawn failed: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("capture thread exited before startup".to_string()))??;

        *guard = Some(CaptureCtl { stop, handle });
        Ok(())
    }

    fn stop_input(&self) {
        let ctl = self.capture.lock().ok().and_then(|mut g| g.take());
        if let Some(ctl) = ctl {
            ctl.stop.store(true, Ordering::Release);
            let _ = ctl.handle.join();
        }
    }

    fn play_chunks(&self, chunks: &mut dyn Iterator<Item = Vec<f32>>) -> Result<()> {
        let host = cpal::default_host();
        let device = find_device(&host, self.config.output_device.as_deref(), false)?;

        let rate = self.config.output_rate;
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(rate)
                    && c.max_sample_rate() >= SampleRate(rate)
            })
            .or_else(|| {
                // Fallback: stereo output, samples duplicated per frame
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.sample_format() == SampleFormat::F32
                        && c.min_sample_rate() <= SampleRate(rate)
                        && c.max_sample_rate() >= SampleRate(rate)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported.with_sample_rate(SampleRate(rate)).config();
        let channels = config.channels as usize;

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue_cb = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue_cb.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let high_water = (rate as f32 * QUEUE_HIGH_WATER_SECS) as usize;

        for chunk in chunks {
            // Back-pressure: do not start the next chunk while the previous
            // ones are still mostly unplayed.
            loop {
                let queued = queue.lock().map_or(0, |q| q.len());
                if queued <= high_water {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }

            if let Ok(mut q) = queue.lock() {
                q.extend(chunk);
            }
        }

        // Drain what remains, then give the device a moment to flush.
        while queue.lock().map_or(0, |q| q.len()) > 0 {
            std::thread::sleep(Duration::from_millis(10));
        }
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        Ok(())
    }
}

/// Locate a device by name substring, or the default device when unnamed
fn find_device(host: &cpal::Host, name: Option<&str>, input: bool) -> Result<Device> {
    if let Some(name) = name {
        let devices = if input { host.input_devices() } else { host.output_devices() }
            .map_err(|e| Error::Audio(e.to_string()))?;

        for device in devices {
            if device.name().is_ok_and(|n| n.contains(name)) {
                return Ok(device);
            }
        }
        return Err(Error::Audio(format!("no audio device matching \"{name}\"")));
    }

    let device = if input { host.default_input_device() } else { host.default_output_device() };
    device.ok_or_else(|| {
        Error::Audio(format!("no default {} device", if input { "input" } else { "output" }))
    })
}

/// Open the input device and pick a config at the requested rate.
///
/// Prefers mono; falls back to any channel count with the first channel
/// extracted in the callback.
fn open_input_stream(name: Option<&str>, rate: u32) -> Result<(InputTarget, usize)> {
    let host = cpal::default_host();
    let device = find_device(&host, name, true)?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(rate)
                && c.max_sample_rate() >= SampleRate(rate)
        })
        .or_else(|| {
            device.supported_input_configs().ok()?.find(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(rate)
                    && c.max_sample_rate() >= SampleRate(rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

    let config = supported.with_sample_rate(SampleRate(rate)).config();
    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = rate,
        channels,
        "audio capture initialized"
    );

    Ok((InputTarget { device, config }, channels))
}

struct InputTarget {
    device: Device,
    config: StreamConfig,
}

fn build_input(
    target: &InputTarget,
    channels: usize,
    on_frame: &mut Box<dyn FnMut(&[f32]) + Send>,
) -> Result<cpal::Stream> {
    // The closure owns a forwarding wrapper; cpal requires 'static.
    let mut forward = std::mem::replace(on_frame, Box::new(|_| {}));
    let mut mono = Vec::new();

    target
        .device
        .build_input_stream(
            &target.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    forward(data);
                } else {
                    mono.clear();
                    mono.extend(data.iter().step_by(channels).copied());
                    forward(&mono);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

fn poisoned() -> Error {
    Error::Audio("capture state lock poisoned".to_string())
}

/// Convert f32 samples to WAV bytes (s16le) for diagnostics dumps
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for sample in super::f32_to_i16(samples) {
            writer.write_sample(sample).map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
