//! Synthetic signals shared by unit tests.

use std::f64::consts::PI;

/// Sine wave with the given RMS amplitude, rounded to 16-bit samples.
pub(crate) fn sine(sample_rate: u32, frequency: f64, rms: f64, len: usize) -> Vec<i16> {
    let peak = rms * 2f64.sqrt();
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (peak * (2.0 * PI * frequency * t).sin()).round() as i16
        })
        .collect()
}

/// Sample-wise saturating sum of two signals of equal length.
pub(crate) fn mix(a: &[i16], b: &[i16]) -> Vec<i16> {
    a.iter().zip(b).map(|(x, y)| x.saturating_add(*y)).collect()
}
