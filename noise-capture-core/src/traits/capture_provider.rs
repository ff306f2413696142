use crate::models::audio_models::{AudioSource, CaptureFormat};
use crate::models::error::CaptureError;

/// Interface for platform-specific audio inputs.
///
/// The supervisor owns the provider for the whole session and drives it
/// from its producer thread: probe formats, open once, read chunks until
/// stopped, then close.
pub trait CaptureProvider: Send + 'static {
    /// Minimum read buffer size in samples (all channels) if `format` is
    /// supported, `None` otherwise.
    fn min_buffer_size(&self, format: &CaptureFormat) -> Option<usize>;

    /// Open the device with a format previously accepted by `min_buffer_size`.
    fn open(&mut self, format: &CaptureFormat, buffer_size: usize) -> Result<(), CaptureError>;

    /// Read interleaved 16-bit samples into `buffer`.
    ///
    /// Returns the number of samples written; 0 means nothing is available
    /// yet. 8-bit devices widen their samples to 16 bits.
    fn read(&mut self, buffer: &mut [i16]) -> Result<usize, CaptureError>;

    /// Stop capturing and release the device.
    fn close(&mut self) -> Result<(), CaptureError>;

    /// Whether a finite source (e.g. a file replay) has delivered everything.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Information about the audio device backing this provider.
    fn device_info(&self) -> AudioSource;
}
