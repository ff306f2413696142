//! Live input capture through cpal.
//!
//! The cpal stream lives on a dedicated thread (streams are not `Send` on
//! every host); its callback forwards converted 16-bit chunks over a bounded
//! channel that `read` drains.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedBufferSize, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use noise_capture_core::models::audio_models::{AudioSource, CaptureFormat, SampleEncoding};
use noise_capture_core::models::error::CaptureError;
use noise_capture_core::processing::pcm;
use noise_capture_core::traits::capture_provider::CaptureProvider;

/// Callback chunks buffered before new ones are dropped.
const CHANNEL_CAPACITY: usize = 64;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Capture from a cpal input device.
pub struct CpalCapture {
    device_name: Option<String>,
    display_name: String,
    configs: Vec<SupportedStreamConfigRange>,
    channels: usize,
    receiver: Option<Receiver<Vec<i16>>>,
    pending: VecDeque<i16>,
    stop: Option<Sender<()>>,
    stream_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    /// Capture from the host's default input device.
    pub fn default_device() -> Result<Self, CaptureError> {
        Self::open_device(None)
    }

    /// Capture from the input device called `name`.
    pub fn with_device(name: &str) -> Result<Self, CaptureError> {
        Self::open_device(Some(name.to_string()))
    }

    /// Input devices of the default host.
    pub fn list_devices() -> Result<Vec<AudioSource>, CaptureError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        Ok(devices
            .filter_map(|d| d.name().ok())
            .map(|name| AudioSource {
                id: name.clone(),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
            })
            .collect())
    }

    fn open_device(device_name: Option<String>) -> Result<Self, CaptureError> {
        let device = find_device(device_name.as_deref())?;
        let display_name = device.name().unwrap_or_else(|_| "Unknown input".into());
        let configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", display_name, e)))?
            .collect();
        Ok(Self {
            device_name,
            display_name,
            configs,
            channels: 1,
            receiver: None,
            pending: VecDeque::new(),
            stop: None,
            stream_handle: None,
        })
    }

    /// Best matching device configuration: native 16-bit before float.
    fn matching_config(&self, format: &CaptureFormat) -> Option<&SupportedStreamConfigRange> {
        let accepted: &[SampleFormat] = match format.encoding {
            SampleEncoding::Pcm16 => &[SampleFormat::I16, SampleFormat::F32],
            SampleEncoding::Pcm8 => &[SampleFormat::U8],
        };
        accepted.iter().find_map(|sample_format| {
            self.configs.iter().find(|range| {
                range.channels() == format.channels
                    && range.sample_format() == *sample_format
                    && range.min_sample_rate().0 <= format.sample_rate
                    && format.sample_rate <= range.max_sample_rate().0
            })
        })
    }
}

impl CaptureProvider for CpalCapture {
    fn min_buffer_size(&self, format: &CaptureFormat) -> Option<usize> {
        let range = self.matching_config(format)?;
        Some(match range.buffer_size() {
            SupportedBufferSize::Range { min, .. } => *min as usize * usize::from(format.channels),
            SupportedBufferSize::Unknown => 0,
        })
    }

    fn open(&mut self, format: &CaptureFormat, _buffer_size: usize) -> Result<(), CaptureError> {
        if self.stream_handle.is_some() {
            return Err(CaptureError::InvalidState("input stream already open".into()));
        }
        let sample_format = self
            .matching_config(format)
            .map(|range| range.sample_format())
            .ok_or_else(|| {
                CaptureError::ConfigurationFailed(format!("{} does not support {}", self.display_name, format))
            })?;
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let (data_tx, data_rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let device_name = self.device_name.clone();

        let handle = thread::Builder::new()
            .name("cpal-capture".into())
            .spawn(move || {
                match build_stream(device_name.as_deref(), &config, sample_format, data_tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Keep the stream alive until close.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::DeviceUnavailable("capture thread exited".into()));
            }
        }

        log::info!("opened {} as {} ({:?})", self.display_name, format, sample_format);
        self.channels = usize::from(format.channels);
        self.receiver = Some(data_rx);
        self.stop = Some(stop_tx);
        self.stream_handle = Some(handle);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize, CaptureError> {
        let Some(receiver) = self.receiver.as_ref() else {
            return Err(CaptureError::InvalidState("input stream is not open".into()));
        };

        if self.pending.is_empty() {
            match receiver.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::CaptureRead("input stream closed".into()))
                }
            }
        }
        while self.pending.len() < buffer.len() {
            match receiver.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => break,
            }
        }

        let wanted = buffer.len() - buffer.len() % self.channels;
        let n = wanted.min(self.pending.len());
        for (dst, src) in buffer[..n].iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.stream_handle.take() {
            if handle.join().is_err() {
                return Err(CaptureError::Unknown("capture thread panicked".into()));
            }
        }
        self.receiver = None;
        self.pending.clear();
        Ok(())
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: self.device_name.clone().unwrap_or_else(|| "default-input".into()),
            name: self.display_name.clone(),
            is_default: self.device_name.is_none(),
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into())),
        Some(name) => host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no input device named {}", name))),
    }
}

fn build_stream(
    device_name: Option<&str>,
    config: &StreamConfig,
    sample_format: SampleFormat,
    sender: Sender<Vec<i16>>,
) -> Result<cpal::Stream, CaptureError> {
    let device = find_device(device_name)?;
    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| forward(&sender, data.to_vec()),
            stream_error,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(&sender, data.iter().map(|&s| f32_to_i16(s)).collect())
            },
            stream_error,
            None,
        ),
        SampleFormat::U8 => device.build_input_stream(
            config,
            move |data: &[u8], _: &cpal::InputCallbackInfo| forward(&sender, pcm::pcm8_to_i16(data)),
            stream_error,
            None,
        ),
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
    Ok(stream)
}

fn forward(sender: &Sender<Vec<i16>>, chunk: Vec<i16>) {
    if sender.try_send(chunk).is_err() {
        log::debug!("capture channel full, chunk dropped");
    }
}

fn stream_error(err: cpal::StreamError) {
    log::warn!("input stream error: {}", err);
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}
