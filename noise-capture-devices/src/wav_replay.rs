//! WAV file replay capture provider.
//!
//! Plays a recorded WAV file through the measurement pipeline as if it
//! came from a capture device. Used for calibration replays and
//! reproducible measurements.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavReader, WavSpec};

use noise_capture_core::models::audio_models::{AudioSource, CaptureFormat, SampleEncoding};
use noise_capture_core::models::error::CaptureError;
use noise_capture_core::traits::capture_provider::CaptureProvider;

/// Smallest read the replay accepts, in samples per channel.
const MIN_FRAMES: usize = 256;

/// Capture provider backed by a 16-bit or 8-bit integer PCM WAV file.
///
/// The file's own rate, depth and channel count is the only format it
/// accepts. In realtime mode reads are paced to the file's sample rate;
/// otherwise the file is delivered as fast as it is consumed.
pub struct WavReplayCapture {
    path: PathBuf,
    spec: WavSpec,
    format: CaptureFormat,
    reader: Option<WavReader<BufReader<File>>>,
    realtime: bool,
    frames_delivered: u64,
    opened_at: Option<Instant>,
    exhausted: bool,
}

impl WavReplayCapture {
    /// Inspect `path` and prepare a replay of it.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let reader = WavReader::open(&path).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let spec = reader.spec();

        let encoding = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => SampleEncoding::Pcm16,
            (SampleFormat::Int, 8) => SampleEncoding::Pcm8,
            (format, bits) => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "{}: unsupported {:?} {}-bit encoding",
                    path.display(),
                    format,
                    bits
                )))
            }
        };
        let format = CaptureFormat {
            sample_rate: spec.sample_rate,
            encoding,
            channels: spec.channels,
        };

        log::info!(
            "replaying {} ({}, {} frames)",
            path.display(),
            format,
            reader.duration()
        );

        Ok(Self {
            path,
            spec,
            format,
            reader: None,
            realtime: false,
            frames_delivered: 0,
            opened_at: None,
            exhausted: false,
        })
    }

    /// Pace reads to the file's sample rate, like a live device.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// The only format this replay accepts.
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    fn wait_for_realtime(&self) {
        let Some(opened_at) = self.opened_at else {
            return;
        };
        let due = Duration::from_secs_f64(self.frames_delivered as f64 / f64::from(self.spec.sample_rate));
        let elapsed = opened_at.elapsed();
        if elapsed < due {
            thread::sleep(due - elapsed);
        }
    }
}

impl CaptureProvider for WavReplayCapture {
    fn min_buffer_size(&self, format: &CaptureFormat) -> Option<usize> {
        (*format == self.format).then_some(MIN_FRAMES * usize::from(self.spec.channels))
    }

    fn open(&mut self, format: &CaptureFormat, _buffer_size: usize) -> Result<(), CaptureError> {
        if *format != self.format {
            return Err(CaptureError::ConfigurationFailed(format!(
                "{} cannot be replayed as {}",
                self.path.display(),
                format
            )));
        }
        let reader = WavReader::open(&self.path).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        self.reader = Some(reader);
        self.frames_delivered = 0;
        self.opened_at = Some(Instant::now());
        self.exhausted = false;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize, CaptureError> {
        if self.realtime {
            self.wait_for_realtime();
        }
        let channels = usize::from(self.spec.channels);
        let encoding = self.format.encoding;
        let Some(reader) = self.reader.as_mut() else {
            return Err(CaptureError::InvalidState("replay is not open".into()));
        };

        // Whole frames only, so channels stay aligned across reads.
        let wanted = buffer.len() - buffer.len() % channels;
        let mut read = 0;
        let result = match encoding {
            SampleEncoding::Pcm16 => reader.samples::<i16>().take(wanted).try_for_each(|s| {
                buffer[read] = s?;
                read += 1;
                Ok::<(), hound::Error>(())
            }),
            SampleEncoding::Pcm8 => reader.samples::<i8>().take(wanted).try_for_each(|s| {
                buffer[read] = i16::from(s?) << 8;
                read += 1;
                Ok(())
            }),
        };
        if let Err(e) = result {
            self.exhausted = true;
            return Err(CaptureError::CaptureRead(format!("{}: {}", self.path.display(), e)));
        }

        if read < wanted {
            self.exhausted = true;
        }
        self.frames_delivered += (read / channels) as u64;
        Ok(read)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        self.reader = None;
        self.opened_at = None;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: self.path.display().to_string(),
            name: self
                .path
                .file_name()
                .map_or_else(|| "WAV replay".into(), |n| n.to_string_lossy().into_owned()),
            is_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use hound::WavWriter;
    use noise_capture_core::{CaptureSupervisor, MeasurementConfiguration};
    use tempfile::TempDir;

    fn write_wav(dir: &TempDir, name: &str, spec: WavSpec, samples: &[i32]) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            match spec.bits_per_sample {
                8 => writer.write_sample(s as i8).unwrap(),
                _ => writer.write_sample(s as i16).unwrap(),
            }
        }
        writer.finalize().unwrap();
        path
    }

    fn spec(channels: u16, bits: u16) -> WavSpec {
        WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn replays_16_bit_file_then_reports_exhaustion() {
        let dir = TempDir::new().unwrap();
        let samples: Vec<i32> = (0..1000).map(|i| i * 10 - 5000).collect();
        let path = write_wav(&dir, "mono.wav", spec(1, 16), &samples);

        let mut replay = WavReplayCapture::new(&path).unwrap();
        let format = replay.format();
        assert_eq!(format, CaptureFormat::mono16(8000));
        assert_eq!(replay.min_buffer_size(&format), Some(MIN_FRAMES));
        assert_eq!(replay.min_buffer_size(&CaptureFormat::mono16(44100)), None);

        replay.open(&format, 600).unwrap();
        let mut buffer = vec![0i16; 600];
        assert_eq!(replay.read(&mut buffer).unwrap(), 600);
        assert_eq!(buffer[0], -5000);
        assert!(!replay.is_exhausted());

        assert_eq!(replay.read(&mut buffer).unwrap(), 400);
        assert_eq!(buffer[399], 4990);
        assert!(replay.is_exhausted());
        assert_eq!(replay.read(&mut buffer).unwrap(), 0);
        replay.close().unwrap();
    }

    #[test]
    fn stereo_reads_keep_whole_frames() {
        let dir = TempDir::new().unwrap();
        let samples: Vec<i32> = (0..20).collect();
        let path = write_wav(&dir, "stereo.wav", spec(2, 16), &samples);

        let mut replay = WavReplayCapture::new(&path).unwrap();
        let format = replay.format();
        assert_eq!(format.channels, 2);
        replay.open(&format, 7).unwrap();

        let mut buffer = vec![0i16; 7];
        assert_eq!(replay.read(&mut buffer).unwrap(), 6);
        assert_eq!(&buffer[..6], &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn eight_bit_samples_are_widened() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "pcm8.wav", spec(1, 8), &[-128, 0, 127]);

        let mut replay = WavReplayCapture::new(&path).unwrap();
        assert_eq!(replay.format().encoding, SampleEncoding::Pcm8);
        replay.open(&replay.format(), 16).unwrap();

        let mut buffer = vec![0i16; 16];
        assert_eq!(replay.read(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer[..3], &[-32768, 0, 32512]);
    }

    #[test]
    fn float_files_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            WavReplayCapture::new(&path),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn replay_measures_calibrated_level() {
        let dir = TempDir::new().unwrap();
        let peak = 2500.0 * 2f64.sqrt();
        let samples: Vec<i32> = (0..88200)
            .map(|i| {
                let t = i as f64 / 44100.0;
                (peak * (2.0 * std::f64::consts::PI * 1000.0 * t).sin()).round() as i32
            })
            .collect();
        let wav_spec = WavSpec {
            sample_rate: 44100,
            ..spec(1, 16)
        };
        let path = write_wav(&dir, "calibration.wav", wav_spec, &samples);

        let replay = WavReplayCapture::new(&path).unwrap();
        let mut session =
            CaptureSupervisor::new(replay, MeasurementConfiguration::default()).unwrap();
        assert_eq!(session.format(), CaptureFormat::mono16(44100));
        session.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !session.source_exhausted() {
            assert!(Instant::now() < deadline, "replay never finished");
            thread::sleep(Duration::from_millis(5));
        }
        let summary = session.stop().unwrap();

        assert_eq!(summary.measurement_count, 2);
        assert_abs_diff_eq!(summary.statistics.mean().unwrap(), 90.0, epsilon = 0.05);
        assert!(session.latest_leq().is_some());
    }

    #[test]
    fn missing_file_is_unavailable() {
        assert!(matches!(
            WavReplayCapture::new("/nonexistent/recording.wav"),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }
}
