// src/dsp/tone.rs  —  Goertzel single-bin power + FFT dominant-frequency search
use rustfft::{num_complex::Complex, FftPlanner};

/// Single-bin Goertzel power of `samples` at `freq_hz`, normalized by n².
/// Mirrors the reference decoder's `_goertzel_power`: the recurrence
/// `q1² + q2² − coeff·q1·q2`, floored at zero before normalization so
/// floating point noise near silence never produces a negative power.
pub fn goertzel_power(samples: &[f32], freq_hz: f32, sample_rate: u32) -> f32 {
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }
    let k = (0.5 + (n as f32 * freq_hz) / sample_rate as f32).floor();
    let omega = (2.0 * std::f32::consts::PI * k) / n as f32;
    let coeff = 2.0 * omega.cos();

    let mut q1 = 0.0f32;
    let mut q2 = 0.0f32;
    for &s in samples {
        let q0 = coeff * q1 - q2 + s;
        q2 = q1;
        q1 = q0;
    }
    let power = q1 * q1 + q2 * q2 - coeff * q1 * q2;
    power.max(0.0) / (n as f32 * n as f32).max(1.0)
}

/// Dominant frequency within `[min_hz, max_hz]` via a Hann-windowed FFT,
/// or `None` if the frame is too short (< 32 samples) or the band is empty.
/// This backs the decoder's optional `auto_tone` mode.
pub fn dominant_frequency(samples: &[f32], sample_rate: u32, min_hz: f32, max_hz: f32) -> Option<f32> {
    let n = samples.len();
    if n < 32 {
        return None;
    }

    let mut buf: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n as f32 - 1.0)).cos();
            Complex::new(s * w, 0.0)
        })
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buf);

    let bin_hz = sample_rate as f32 / n as f32;
    let lo = (min_hz / bin_hz).floor().max(0.0) as usize;
    let hi = ((max_hz / bin_hz).ceil() as usize).min(n / 2);
    if lo >= hi {
        return None;
    }

    let mut best_bin = None;
    let mut best_mag = 0.0f32;
    for (bin, c) in buf[lo..hi].iter().enumerate() {
        let mag = c.norm_sqr();
        if mag > best_mag {
            best_mag = mag;
            best_bin = Some(lo + bin);
        }
    }
    best_bin.map(|b| b as f32 * bin_hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn goertzel_peaks_on_matching_tone() {
        let samples = sine(650.0, 8000, 480);
        let on_tone = goertzel_power(&samples, 650.0, 8000);
        let off_tone = goertzel_power(&samples, 1200.0, 8000);
        assert!(on_tone > off_tone * 10.0);
    }

    #[test]
    fn goertzel_silence_is_zero() {
        let samples = vec![0.0f32; 480];
        assert_eq!(goertzel_power(&samples, 650.0, 8000), 0.0);
    }

    #[test]
    fn dominant_frequency_finds_tone_in_band() {
        let samples = sine(700.0, 8000, 1024);
        let f = dominant_frequency(&samples, 8000, 300.0, 1200.0).unwrap();
        assert!((f - 700.0).abs() < 50.0);
    }

    #[test]
    fn dominant_frequency_none_on_short_frame() {
        let samples = sine(700.0, 8000, 8);
        assert!(dominant_frequency(&samples, 8000, 300.0, 1200.0).is_none());
    }
}
