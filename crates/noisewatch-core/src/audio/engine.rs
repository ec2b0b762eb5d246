//! Audio capture engine for device management and frame delivery
//!
//! Provides high-level interface for:
//! - Enumerating input devices
//! - Opening an input stream at the configured sample rate
//! - Turning callback buffers into fixed-size, time-stamped frames
//!
//! ## Callback Path
//!
//! The input callback only re-chunks and hands frames to a bounded
//! crossbeam channel with `try_send`. It never blocks and never touches the
//! detector or the disk. When the consumer falls behind, frames are dropped
//! and counted.

use anyhow::{anyhow, Result};
use chrono::Local;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::detection::event::Timestamp;

/// Frames that may wait for the monitor (about 6 s at the default frame size)
const FRAME_QUEUE_CAPACITY: usize = 256;

/// Errors that can occur during audio engine operations
#[derive(Error, Debug)]
pub enum AudioEngineError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),
}

/// Input device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default input device
    pub is_default: bool,
    /// Supported sample rates
    pub sample_rates: Vec<u32>,
    /// Number of input channels
    pub input_channels: u16,
}

/// Audio engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine is stopped
    Stopped,
    /// Engine is capturing audio
    Running,
}

/// A block of samples with its capture time
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Samples in `[-1.0, 1.0]`, interleaved when the device has several channels
    pub samples: Vec<f32>,
    /// Wall-clock time the frame was completed
    pub captured_at: Timestamp,
}

impl Frame {
    /// Create a new frame
    pub fn new(samples: Vec<f32>, captured_at: Timestamp) -> Self {
        Self {
            samples,
            captured_at,
        }
    }
}

/// Re-chunks interleaved callback buffers into frames of exactly
/// `frame_size` sample frames (`frame_size * channels` samples)
///
/// Callback buffer sizes are chosen by the driver and rarely match the
/// analysis frame size; leftover samples are carried into the next call.
/// Channels stay interleaved so the level covers the energy of all of them.
#[derive(Debug)]
pub struct FrameChunker {
    /// Interleaved samples per emitted frame
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    /// Create a chunker
    ///
    /// # Arguments
    /// * `frame_size` - Sample frames (one sample per channel) per emitted frame (at least 1)
    /// * `channels` - Interleaved channel count of incoming buffers (at least 1)
    pub fn new(frame_size: usize, channels: usize) -> Self {
        let frame_len = frame_size.max(1) * channels.max(1);
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Feed one interleaved buffer, calling `emit` for every completed frame
    pub fn push<F>(&mut self, interleaved: &[f32], captured_at: Timestamp, mut emit: F)
    where
        F: FnMut(Frame),
    {
        self.pending.extend_from_slice(interleaved);

        let mut offset = 0;
        while self.pending.len() - offset >= self.frame_len {
            let samples = self.pending[offset..offset + self.frame_len].to_vec();
            emit(Frame::new(samples, captured_at));
            offset += self.frame_len;
        }
        self.pending.drain(..offset);
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Audio capture engine
pub struct AudioEngine {
    state: EngineState,
    sample_rate: u32,
    frame_size: usize,
    device_name: Option<String>,
    device: Option<Device>,
    stream: Option<Stream>,
    /// Running flag (shared with callback via Arc)
    running: Option<Arc<AtomicBool>>,
    /// Frames queued for the monitor (shared with callback via Arc)
    captured_frames: Arc<AtomicU64>,
    /// Frames dropped on a full queue (shared with callback via Arc)
    dropped_frames: Arc<AtomicU64>,
}

impl AudioEngine {
    /// Create a new audio engine with default settings
    pub fn new() -> Self {
        Self {
            state: EngineState::Stopped,
            sample_rate: crate::SAMPLE_RATE,
            frame_size: crate::DEFAULT_FRAME_SIZE,
            device_name: None,
            device: None,
            stream: None,
            running: None,
            captured_frames: Arc::new(AtomicU64::new(0)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get current engine state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Get sample rate (the effective rate once started)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Set sample rate (must be called before start)
    pub fn set_sample_rate(&mut self, rate: u32) {
        if (8000..=384000).contains(&rate) {
            self.sample_rate = rate;
        }
    }

    /// Get frame size in samples
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Set frame size (must be called before start)
    pub fn set_frame_size(&mut self, frame_size: usize) {
        if frame_size > 0 {
            self.frame_size = frame_size;
        }
    }

    fn host() -> Host {
        cpal::default_host()
    }

    /// List available input devices
    ///
    /// # Returns
    /// Vector of device information for every device with an input config
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = Self::host();
        let mut devices = Vec::new();

        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        for device in host.input_devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_name.as_deref() == Some(name.as_str());

            let input_channels = device
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0);

            let common_rates = [16000, 22050, 44100, 48000, 88200, 96000];
            let mut sample_rates = Vec::new();

            if let Ok(configs) = device.supported_input_configs() {
                for config in configs {
                    for &rate in &common_rates {
                        if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                            && !sample_rates.contains(&rate)
                        {
                            sample_rates.push(rate);
                        }
                    }
                }
            }

            sample_rates.sort();

            devices.push(DeviceInfo {
                name,
                is_default,
                sample_rates,
                input_channels,
            });
        }

        Ok(devices)
    }

    /// Select an input device by name
    ///
    /// # Arguments
    /// * `name` - Exact device name as shown by [`AudioEngine::list_devices`]
    pub fn select_device(&mut self, name: &str) -> Result<()> {
        let host = Self::host();

        let device = host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioEngineError::DeviceNotFound(name.to_string()))?;

        self.device = Some(device);
        self.device_name = Some(name.to_string());

        Ok(())
    }

    /// Select the host's default input device
    pub fn select_default_device(&mut self) -> Result<()> {
        let device = Self::host()
            .default_input_device()
            .ok_or(AudioEngineError::NoInputDevice)?;

        self.device_name = Some(device.name().unwrap_or_else(|_| "Unknown".to_string()));
        self.device = Some(device);

        Ok(())
    }

    /// Get the selected device name
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Start capturing
    ///
    /// Uses the selected device, or the default input device if none was
    /// selected. The configured sample rate is tried first; if the device
    /// rejects it, its default rate is used and [`AudioEngine::sample_rate`]
    /// reports the rate actually in effect.
    ///
    /// # Returns
    /// Receiver yielding frames of exactly `frame_size` mono samples
    pub fn start(&mut self) -> Result<Receiver<Frame>> {
        if self.state == EngineState::Running {
            return Err(anyhow!("Audio engine already running"));
        }
        if self.device.is_none() {
            self.select_default_device()?;
        }
        let device = self
            .device
            .as_ref()
            .ok_or(AudioEngineError::NoInputDevice)?;

        let default_input = device.default_input_config();
        tracing::info!(
            "Device default input config: {:?}",
            default_input
                .as_ref()
                .map(|c| (c.sample_rate().0, c.channels()))
        );

        let device_rate = default_input
            .as_ref()
            .map(|c| c.sample_rate().0)
            .unwrap_or(self.sample_rate);
        let channels = default_input.as_ref().map(|c| c.channels()).unwrap_or(1);

        let rates_to_try = if device_rate != self.sample_rate {
            vec![self.sample_rate, device_rate]
        } else {
            vec![self.sample_rate]
        };

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Frame>(FRAME_QUEUE_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        self.captured_frames.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);

        let mut opened = None;
        let mut last_error = None;
        for &rate in &rates_to_try {
            let config = StreamConfig {
                channels,
                sample_rate: SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            };
            match self.build_stream(device, &config, frame_tx.clone(), Arc::clone(&running)) {
                Ok(stream) => {
                    if rate != self.sample_rate {
                        tracing::warn!(
                            "Configured rate {} Hz failed, using device default {} Hz",
                            self.sample_rate,
                            rate
                        );
                    }
                    opened = Some((stream, rate));
                    break;
                }
                Err(e) => {
                    tracing::warn!("Sample rate {} Hz failed: {}", rate, e);
                    last_error = Some(e);
                }
            }
        }

        let (stream, effective_rate) = opened.ok_or_else(|| {
            AudioEngineError::StreamError(
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no sample rate to try".to_string()),
            )
        })?;

        stream.play()?;

        self.stream = Some(stream);
        self.running = Some(running);
        self.sample_rate = effective_rate;
        self.state = EngineState::Running;

        tracing::info!(
            "Audio engine started: {} @ {}Hz, {} channel(s), {} samples per frame",
            self.device_name.as_deref().unwrap_or("unknown"),
            effective_rate,
            channels,
            self.frame_size
        );

        Ok(frame_rx)
    }

    fn build_stream(
        &self,
        device: &Device,
        config: &StreamConfig,
        frame_tx: Sender<Frame>,
        running: Arc<AtomicBool>,
    ) -> std::result::Result<Stream, cpal::BuildStreamError> {
        let mut chunker = FrameChunker::new(self.frame_size, config.channels as usize);
        let captured = Arc::clone(&self.captured_frames);
        let dropped = Arc::clone(&self.dropped_frames);

        device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                chunker.push(data, Local::now(), |frame| {
                    match frame_tx.try_send(frame) {
                        Ok(()) => {
                            captured.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            },
            move |err| {
                tracing::error!("Input stream error: {}", err);
            },
            None,
        )
    }

    /// Stop capturing
    ///
    /// Dropping the stream closes the frame channel once queued frames are
    /// consumed.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(ref running) = self.running {
            running.store(false, Ordering::Relaxed);
        }

        let was_running = self.stream.take().is_some();
        self.running = None;
        self.state = EngineState::Stopped;

        if was_running {
            tracing::info!("Audio engine stopped");
        }

        Ok(())
    }

    /// Frames delivered to the monitor since start
    pub fn captured_frames(&self) -> u64 {
        self.captured_frames.load(Ordering::Relaxed)
    }

    /// Frames dropped because the monitor fell behind
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
