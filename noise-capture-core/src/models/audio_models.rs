use std::fmt;

use serde::{Deserialize, Serialize};

/// PCM sample encoding delivered by a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    Pcm16,
    Pcm8,
}

impl SampleEncoding {
    pub fn bits(&self) -> u16 {
        match self {
            Self::Pcm16 => 16,
            Self::Pcm8 => 8,
        }
    }
}

/// A (sample rate, encoding, channel count) combination a device may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub encoding: SampleEncoding,
    pub channels: u16,
}

impl CaptureFormat {
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            encoding: SampleEncoding::Pcm16,
            channels: 1,
        }
    }

    /// Every combination for the given rates, most preferred first:
    /// higher sample rate, then 16-bit over 8-bit, then mono over stereo.
    pub fn candidates(sample_rates: &[u32]) -> Vec<CaptureFormat> {
        let mut rates = sample_rates.to_vec();
        rates.sort_unstable_by(|a, b| b.cmp(a));
        rates.dedup();

        let mut formats = Vec::with_capacity(rates.len() * 4);
        for &sample_rate in &rates {
            for encoding in [SampleEncoding::Pcm16, SampleEncoding::Pcm8] {
                for channels in [1u16, 2] {
                    formats.push(CaptureFormat {
                        sample_rate,
                        encoding,
                        channels,
                    });
                }
            }
        }
        formats
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {}-bit, {} ch",
            self.sample_rate,
            self.encoding.bits(),
            self.channels
        )
    }
}

/// An audio input available for capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Counters for debugging measurement sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionDiagnostics {
    pub chunks_captured: u64,
    pub samples_captured: u64,
    pub read_errors: u64,
    pub spectrum_updates: u64,
    pub measurements_emitted: u64,
    pub analysis_failures: u64,
}
