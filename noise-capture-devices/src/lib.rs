//! # noise-capture-devices
//!
//! Capture backends for noise-capture.
//!
//! Provides:
//! - `WavReplayCapture`: replays a 16-bit or 8-bit PCM WAV file as a capture device
//! - `CpalCapture`: live input through cpal (feature `cpal`)
//!
//! ## Usage
//! ```ignore
//! use noise_capture_core::{CaptureSupervisor, MeasurementConfiguration};
//! use noise_capture_devices::WavReplayCapture;
//!
//! let replay = WavReplayCapture::new("calibration.wav")?;
//! let mut session = CaptureSupervisor::new(replay, MeasurementConfiguration::default())?;
//! session.start()?;
//! ```

#[cfg(feature = "cpal")]
pub mod cpal_capture;
pub mod wav_replay;

#[cfg(feature = "cpal")]
pub use cpal_capture::CpalCapture;
pub use wav_replay::WavReplayCapture;
