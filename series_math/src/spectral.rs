//! Orthonormal discrete cosine transform
//!
//! DCT-II / DCT-III pair with orthonormal scaling, and a low-pass smoother that
//! zeroes the high-frequency coefficients. Also one-sided power spectra of
//! Hann-windowed segments for spectrograms. Direct O(n^2) evaluation.

use crate::{MathError, Result};
use std::f64::consts::PI;

/// Orthonormal DCT-II
pub fn dct(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;

    (0..n)
        .map(|k| {
            let sum: f64 = values
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (PI * (i as f64 + 0.5) * k as f64 / nf).cos())
                .sum();
            sum * basis_weight(k, nf)
        })
        .collect()
}

/// Inverse of [`dct`] (orthonormal DCT-III)
pub fn idct(coefficients: &[f64]) -> Vec<f64> {
    let n = coefficients.len();
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;

    (0..n)
        .map(|i| {
            coefficients
                .iter()
                .enumerate()
                .map(|(k, &c)| c * basis_weight(k, nf) * (PI * (i as f64 + 0.5) * k as f64 / nf).cos())
                .sum()
        })
        .collect()
}

fn basis_weight(k: usize, n: f64) -> f64 {
    if k == 0 {
        (1.0 / n).sqrt()
    } else {
        (2.0 / n).sqrt()
    }
}

/// Smooth `values` by keeping the lowest `cutoff` fraction of DCT coefficients.
pub fn lowpass(values: &[f64], cutoff: f64) -> Result<Vec<f64>> {
    if !(cutoff > 0.0 && cutoff <= 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Cutoff must be in (0, 1], got {}",
            cutoff
        )));
    }

    let mut coefficients = dct(values);
    // Always keep the mean component
    let keep = ((cutoff * values.len() as f64) as usize).max(1);
    for c in coefficients.iter_mut().skip(keep) {
        *c = 0.0;
    }

    Ok(idct(&coefficients))
}

/// One-sided power spectral density of a single segment.
///
/// The segment mean is removed and a periodic Hann window applied. Bin `k`
/// holds frequency `k / len` cycles per sample, for `k` in `0..=len / 2`.
pub fn power_spectrum(segment: &[f64]) -> Result<Vec<f64>> {
    let n = segment.len();
    if n < 4 {
        return Err(MathError::InsufficientData(format!(
            "Power spectrum needs at least 4 samples, have {}",
            n
        )));
    }
    let nf = n as f64;
    let center = segment.iter().sum::<f64>() / nf;
    let window: Vec<f64> = (0..n).map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / nf).cos()).collect();
    let energy: f64 = window.iter().map(|w| w * w).sum();
    let tapered: Vec<f64> = segment
        .iter()
        .zip(&window)
        .map(|(x, w)| (x - center) * w)
        .collect();

    let bins = n / 2;
    Ok((0..=bins)
        .map(|k| {
            let (re, im) = tapered.iter().enumerate().fold((0.0, 0.0), |(re, im), (i, x)| {
                let angle = 2.0 * PI * (k * i) as f64 / nf;
                (re + x * angle.cos(), im - x * angle.sin())
            });
            let power = (re * re + im * im) / energy;
            // fold negative frequencies into the one-sided spectrum
            if k == 0 || (n % 2 == 0 && k == bins) {
                power
            } else {
                2.0 * power
            }
        })
        .collect())
}

/// Power spectra of segments of length `window` starting every `step` samples.
///
/// Returns `(start index, spectrum)` per segment; a trailing partial segment is dropped.
pub fn spectrogram(values: &[f64], window: usize, step: usize) -> Result<Vec<(usize, Vec<f64>)>> {
    if step == 0 {
        return Err(MathError::InvalidInput("Spectrogram step must be at least 1".to_string()));
    }
    if window > values.len() {
        return Err(MathError::InsufficientData(format!(
            "Spectrogram window of {} exceeds {} values",
            window,
            values.len()
        )));
    }
    (0..=values.len() - window)
        .step_by(step)
        .map(|start| Ok((start, power_spectrum(&values[start..start + window])?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_restores_signal() {
        let values = [3.0, -1.0, 4.0, 1.5, 9.0, 2.0];
        let restored = idct(&dct(&values));
        for (a, b) in values.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_signal_has_only_dc_component() {
        let coefficients = dct(&[2.0; 8]);
        assert!((coefficients[0] - 2.0 * 8f64.sqrt()).abs() < 1e-9);
        assert!(coefficients[1..].iter().all(|c| c.abs() < 1e-9));
    }

    #[test]
    fn test_lowpass_removes_alternating_noise() {
        let values: Vec<f64> = (0..40)
            .map(|i| 10.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let smoothed = lowpass(&values, 0.1).unwrap();

        assert!(smoothed.iter().all(|v| (v - 10.0).abs() < 0.2));
        assert!(lowpass(&values, 0.0).is_err());
    }

    #[test]
    fn test_power_spectrum_peaks_at_signal_frequency() {
        // 7 full daily cycles in a week of hourly samples
        let values: Vec<f64> = (0..168)
            .map(|i| 3.0 + (2.0 * PI * i as f64 / 24.0).sin())
            .collect();
        let spectrum = power_spectrum(&values).unwrap();

        assert_eq!(spectrum.len(), 85);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k);
        assert_eq!(peak, Some(7));
        // mean removed before the transform
        assert!(spectrum[0] < 1e-9);
    }

    #[test]
    fn test_spectrogram_segments() {
        let values = vec![1.0; 100];
        let segments = spectrogram(&values, 40, 20).unwrap();
        let starts: Vec<usize> = segments.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0, 20, 40, 60]);
        assert!(spectrogram(&values, 101, 20).is_err());
        assert!(spectrogram(&values, 40, 0).is_err());
    }
}
