//! Microphone capture with cpal
//!
//! Builds an input stream at the configured sample rate and feeds 16-bit
//! little-endian mono PCM into the shared [`RingBuffer`] from the driver
//! callback. The callback never blocks: when the buffer is full the tail of
//! the chunk is dropped, which signals a slow consumer rather than a capture
//! fault.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::buffer::RingBuffer;
use crate::error::{AudioError, Result};

/// Behavior contract for the capture pipeline, so other platforms (and
/// tests) can stand in for the cpal implementation.
pub trait AudioCapture {
    /// Open the capture stream. Leaves no partial state behind on failure.
    fn start(&mut self) -> Result<()>;

    /// Tear the stream down. Idempotent; synchronizes driver teardown before
    /// returning.
    fn stop(&mut self);

    /// Most recently declared capture intent.
    fn is_capturing(&self) -> bool;
}

/// cpal-backed microphone capture.
pub struct CpalCapture {
    ring: Arc<RingBuffer>,
    sample_rate: u32,
    capturing: Arc<AtomicBool>,
    stream: Option<Stream>,
}

impl CpalCapture {
    pub fn new(ring: Arc<RingBuffer>, sample_rate: u32) -> Self {
        Self {
            ring,
            sample_rate,
            capturing: Arc::new(AtomicBool::new(false)),
            stream: None,
        }
    }
}

impl AudioCapture for CpalCapture {
    fn start(&mut self) -> Result<()> {
        if self.capturing.load(Ordering::Relaxed) {
            warn!("audio capture already running");
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::device("no default input device"))?;

        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::device(format!("failed to query device config: {e}")))?;

        let config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match default_config.sample_format() {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, &self.ring, &self.capturing),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, &self.ring, &self.capturing),
            SampleFormat::F32 => build_stream::<f32>(&device, &config, &self.ring, &self.capturing),
            other => Err(AudioError::stream(format!("unsupported sample format {other:?}"))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::stream(format!("failed to start stream: {e}")))?;

        self.stream = Some(stream);
        self.capturing.store(true, Ordering::Release);

        info!(
            "audio capture started ({} Hz, {} channel(s) at device)",
            self.sample_rate,
            config.channels
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.capturing.store(false, Ordering::Release);

        // Dropping the stream tears the driver loop down and waits for any
        // in-flight callback.
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!("audio capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    ring: &Arc<RingBuffer>,
    capturing: &Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let ring = Arc::clone(ring);
    let capturing = Arc::clone(capturing);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !capturing.load(Ordering::Relaxed) {
                    return;
                }

                let mut bytes = Vec::with_capacity((data.len() / channels) * 2);
                for frame in data.chunks(channels) {
                    // First channel only; averaging halves the amplitude
                    // when the mic only drives one channel.
                    let sample = i16::from_sample(frame[0]);
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }

                let written = ring.write(&bytes);
                if written < bytes.len() {
                    trace!("ring buffer full, dropped {} bytes", bytes.len() - written);
                }
            },
            |err| warn!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::stream(format!("failed to build input stream: {e}")))
}
