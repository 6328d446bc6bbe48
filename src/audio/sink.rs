//! Audio sinks: whatever drives the consumer callback on its own clock.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::consumer::StreamCallback;
use crate::config::{SampleFormat, StreamConfig};
use crate::error::{StreamError, StreamResult};

/// Something that periodically pulls a fixed-size block through a
/// [`StreamCallback`].
///
/// After `deactivate` returns, the callback is never invoked again and has
/// been dropped.
pub trait AudioSink {
    fn activate(&mut self, callback: StreamCallback) -> StreamResult<()>;
    fn deactivate(&mut self);
    fn name(&self) -> String;
}

// ─── Device output (cpal) ───

/// Sample types the device stream can be opened with. Stream bytes are
/// little-endian; the device wants native order.
trait WireSample: cpal::SizedSample + bytemuck::Pod {
    fn le_to_native(&mut self);
}

impl WireSample for i16 {
    #[inline]
    fn le_to_native(&mut self) {
        *self = i16::from_le(*self);
    }
}

impl WireSample for f32 {
    #[inline]
    fn le_to_native(&mut self) {
        *self = f32::from_bits(u32::from_le(self.to_bits()));
    }
}

pub struct CpalSink {
    device_name: Option<String>,
    sample_rate: u32,
    channels: u16,
    frames_per_callback: u32,
    format: SampleFormat,
    stream: Option<cpal::Stream>,
}

impl CpalSink {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            device_name: config.device.clone(),
            sample_rate: config.sample_rate,
            channels: config.channel_count,
            frames_per_callback: config.frames_per_callback,
            format: config.sample_format,
            stream: None,
        }
    }

    fn open_device(&self) -> StreamResult<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(wanted) => host
                .output_devices()
                .map_err(StreamError::device)?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| StreamError::Device(format!("No output device named '{}'", wanted))),
            None => host
                .default_output_device()
                .ok_or_else(|| StreamError::Device("No output device".into())),
        }
    }

    fn build<T: WireSample>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut callback: StreamCallback,
    ) -> Result<cpal::Stream, cpal::BuildStreamError> {
        device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                callback.fill(bytemuck::cast_slice_mut(&mut data[..]));
                if cfg!(target_endian = "big") {
                    for s in data.iter_mut() {
                        s.le_to_native();
                    }
                }
            },
            move |err| {
                log::error!("Stream error: {}", err);
            },
            None,
        )
    }

    fn build_for_format(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        callback: StreamCallback,
    ) -> Result<cpal::Stream, cpal::BuildStreamError> {
        match self.format {
            SampleFormat::S16 => Self::build::<i16>(device, config, callback),
            SampleFormat::F32 => Self::build::<f32>(device, config, callback),
        }
    }
}

impl AudioSink for CpalSink {
    fn activate(&mut self, callback: StreamCallback) -> StreamResult<()> {
        let device = self.open_device()?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        if let Ok(configs) = device.supported_output_configs() {
            let supported = configs.into_iter().any(|range| {
                self.sample_rate >= range.min_sample_rate().0
                    && self.sample_rate <= range.max_sample_rate().0
                    && range.channels() >= self.channels
            });
            if !supported {
                log::warn!(
                    "'{}' doesn't natively support {}Hz x{}. OS will resample.",
                    device_name,
                    self.sample_rate,
                    self.channels
                );
            }
        }

        let mut config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: BufferSize::Fixed(self.frames_per_callback),
        };

        let stream = match self.build_for_format(&device, &config, callback.clone()) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!(
                    "Fixed buffer of {} frames rejected ({}), using device default",
                    self.frames_per_callback,
                    e
                );
                config.buffer_size = BufferSize::Default;
                self.build_for_format(&device, &config, callback)
                    .map_err(StreamError::device)?
            }
        };

        stream.play().map_err(StreamError::device)?;
        log::info!(
            "Output '{}' started: {}Hz, {} channels, {:?}",
            device_name,
            self.sample_rate,
            self.channels,
            self.format
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn deactivate(&mut self) {
        // Dropping the stream stops the device and releases the callback.
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }

    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default output".into())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ─── Headless output ───

/// Pulls blocks on a timer thread at the device cadence. Output is discarded,
/// or copied to a tap channel when one is attached.
pub struct ClockSink {
    period: Duration,
    block_bytes: usize,
    tap: Option<Sender<Vec<u8>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ClockSink {
    pub fn new(config: &StreamConfig) -> Self {
        Self::with_period(config.callback_period(), config.callback_bytes())
    }

    pub fn with_period(period: Duration, block_bytes: usize) -> Self {
        Self {
            period,
            block_bytes,
            tap: None,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Receive a copy of every block handed to the "device".
    pub fn with_tap(mut self, tap: Sender<Vec<u8>>) -> Self {
        self.tap = Some(tap);
        self
    }
}

impl AudioSink for ClockSink {
    fn activate(&mut self, mut callback: StreamCallback) -> StreamResult<()> {
        if self.thread.is_some() {
            return Err(StreamError::Device("clock sink already active".into()));
        }

        let period = self.period;
        let mut block = vec![0u8; self.block_bytes];
        let tap = self.tap.clone();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-clock".into())
            .spawn(move || {
                let mut next = Instant::now();
                while running.load(Ordering::SeqCst) {
                    callback.fill(&mut block);
                    if let Some(tap) = &tap {
                        let _ = tap.send(block.clone());
                    }

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        // Fell behind; don't try to catch up with a burst.
                        next = now;
                    }
                }
            })?;

        log::info!(
            "Headless output started: {} bytes every {:?}",
            self.block_bytes,
            self.period
        );
        self.thread = Some(handle);
        Ok(())
    }

    fn deactivate(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Audio clock thread panicked");
            }
        }
    }

    fn name(&self) -> String {
        "headless".into()
    }
}

impl Drop for ClockSink {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ─── Device Enumeration ───

#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

pub fn get_output_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mut devices = Vec::new();
    if let Ok(out) = host.output_devices() {
        for dev in out {
            if let Ok(name) = dev.name() {
                let is_default = default_name.as_deref() == Some(name.as_str());
                devices.push(AudioDeviceInfo { name, is_default });
            }
        }
    }
    devices
}
