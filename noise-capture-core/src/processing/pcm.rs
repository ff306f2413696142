//! PCM helpers applied to captured chunks before they reach the analysis lanes.

/// Multiply every sample by `gain`, saturating at the 16-bit range.
pub fn apply_gain(samples: &mut [i16], gain: f64) {
    if (gain - 1.0).abs() < f64::EPSILON {
        return;
    }
    for sample in samples.iter_mut() {
        let scaled = (f64::from(*sample) * gain).round();
        *sample = scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
///
/// A trailing partial frame is dropped.
pub fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Widen unsigned 8-bit PCM (silence at 128) to signed 16-bit.
pub fn pcm8_to_i16(samples: &[u8]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (i16::from(s) - 128) << 8)
        .collect()
}
