//! Shared DSP utilities: gain conversions, musical ratios, analysis windows,
//! averages and the fixed-length accumulator operations used by the
//! overlap-add pipeline.

// ============================================================================
// Constants
// ============================================================================

/// Frequency ratio of one equal-tempered semitone (2^(1/12))
pub const SEMITONE_RATIO: f32 = 1.059_463_1;

/// Frequency ratio of half a semitone (2^(1/24)), the tolerance used when
/// matching harmonics against integer multiples of a candidate fundamental
pub const SQRT_SEMITONE_RATIO: f32 = 1.029_302_2;

/// log2 of the semitone ratio (1/12)
pub const LOG_SEMITONE: f32 = 1.0 / 12.0;

// ============================================================================
// Gain Conversions
// ============================================================================

/// Convert linear amplitude to decibels
/// Returns -inf for zero or negative values
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -f32::INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db * 0.05)
}

/// Convert a shift in semitones to a frequency factor
#[inline]
pub fn semitones_to_factor(semitones: f32) -> f32 {
    2.0_f32.powf(semitones * LOG_SEMITONE)
}

/// Convert a frequency factor to a shift in semitones
/// Returns -inf for zero or negative factors
#[inline]
pub fn factor_to_semitones(factor: f32) -> f32 {
    if factor <= 0.0 {
        -f32::INFINITY
    } else {
        factor.log2() * 12.0
    }
}

/// Ratio of the larger to the smaller of two positive values
#[inline]
pub fn max_ratio(f0: f32, f1: f32) -> f32 {
    if f0 > f1 {
        f0 / f1
    } else {
        f1 / f0
    }
}

// ============================================================================
// Analysis Windows
// ============================================================================

/// Fill `window` with a symmetric cosine window `a0 - (1 - a0)·cos(2π·i/(N-1))`
pub fn cosine_window_into(window: &mut [f32], a0: f32) {
    let size = window.len();
    if size < 2 {
        window.fill(1.0);
        return;
    }

    let step = std::f32::consts::TAU / (size - 1) as f32;
    let one_minus_a0 = 1.0 - a0;
    for (i, w) in window.iter_mut().enumerate() {
        *w = a0 - one_minus_a0 * (i as f32 * step).cos();
    }
}

/// Generate a von-Hann window (allocating version)
pub fn make_von_hann_window(size: usize) -> Vec<f32> {
    let mut window = vec![0.0; size];
    cosine_window_into(&mut window, 0.5);
    window
}

/// Generate a Hamming window (allocating version)
pub fn make_hamming_window(size: usize) -> Vec<f32> {
    let mut window = vec![0.0; size];
    cosine_window_into(&mut window, 25.0 / 46.0);
    window
}

// ============================================================================
// Averages
// ============================================================================

/// Arithmetic mean; 0 for an empty sequence
pub fn average<I: IntoIterator<Item = f32>>(values: I) -> f32 {
    let mut count = 0usize;
    let sum = values.into_iter().fold(0.0, |acc, v| {
        count += 1;
        acc + v
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Geometric mean computed as 2^(mean of log2); 0 for an empty sequence
pub fn geometric_average<I: IntoIterator<Item = f32>>(values: I) -> f32 {
    let mut count = 0usize;
    let log_sum = values.into_iter().fold(0.0, |acc, v| {
        count += 1;
        acc + v.log2()
    });
    if count == 0 {
        0.0
    } else {
        2.0_f32.powf(log_sum / count as f32)
    }
}

/// Weight-averaged geometric mean over `(value, weight)` pairs
pub fn weighted_geometric_average<I: IntoIterator<Item = (f32, f32)>>(pairs: I) -> f32 {
    let mut weight_sum = 0.0;
    let log_sum = pairs.into_iter().fold(0.0, |acc, (v, w)| {
        weight_sum += w;
        acc + w * v.log2()
    });
    if weight_sum == 0.0 {
        0.0
    } else {
        2.0_f32.powf(log_sum / weight_sum)
    }
}

/// Root mean square of a buffer
#[inline]
pub fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = buffer.iter().map(|&x| x * x).sum();
    (sum_squares / buffer.len() as f32).sqrt()
}

/// Peak absolute amplitude of a buffer
#[inline]
pub fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().map(|&x| x.abs()).fold(0.0_f32, f32::max)
}

// ============================================================================
// Ring Accumulator
// ============================================================================

/// Shift `buffer` left by `samples.len()` and copy `samples` into the tail.
/// When more samples arrive than fit, only the trailing window is retained.
pub fn ring_push(buffer: &mut [f32], samples: &[f32]) {
    let len = buffer.len();
    let num = samples.len();
    if num >= len {
        buffer.copy_from_slice(&samples[num - len..]);
    } else {
        buffer.copy_within(num.., 0);
        buffer[len - num..].copy_from_slice(samples);
    }
}

/// Shift `buffer` left by `count` and fill the tail with `value`
pub fn ring_push_value(buffer: &mut [f32], value: f32, count: usize) {
    let len = buffer.len();
    if count >= len {
        buffer.fill(value);
    } else {
        buffer.copy_within(count.., 0);
        buffer[len - count..].fill(value);
    }
}

// ============================================================================
// Test Signals
// ============================================================================

/// Generate a sine wave of the given amplitude and frequency
pub fn make_sine_wave(amplitude: f32, frequency: f32, sample_rate: f32, length: usize) -> Vec<f32> {
    let delta = std::f32::consts::TAU * frequency / sample_rate;
    (0..length)
        .map(|i| amplitude * (i as f32 * delta).sin())
        .collect()
}

/// Generate a unit impulse at sample 0
pub fn make_dirac(amplitude: f32, length: usize) -> Vec<f32> {
    let mut signal = vec![0.0; length];
    if length > 0 {
        signal[0] = amplitude;
    }
    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversion() {
        assert_eq!(linear_to_db(1.0), 0.0);
        assert!((linear_to_db(0.1) - (-20.0)).abs() < 0.001);
        assert_eq!(db_to_linear(0.0), 1.0);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 0.001);
        assert_eq!(linear_to_db(0.0), -f32::INFINITY);
        assert!((db_to_linear(-60.0) - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_semitone_factors() {
        assert!((semitones_to_factor(12.0) - 2.0).abs() < 1e-6);
        assert!((semitones_to_factor(-12.0) - 0.5).abs() < 1e-6);
        assert!((semitones_to_factor(1.0) - SEMITONE_RATIO).abs() < 1e-6);
        assert!((factor_to_semitones(2.0) - 12.0).abs() < 1e-5);
        assert_eq!(factor_to_semitones(0.0), -f32::INFINITY);
    }

    #[test]
    fn test_max_ratio_is_symmetric() {
        assert!((max_ratio(2.0, 1.0) - 2.0).abs() < 1e-6);
        assert!((max_ratio(1.0, 2.0) - 2.0).abs() < 1e-6);
        assert!((max_ratio(440.0, 440.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_von_hann_window() {
        let window = make_von_hann_window(5);
        assert_eq!(window.len(), 5);
        assert!(window[0].abs() < 1e-6, "endpoints must be zero");
        assert!(window[4].abs() < 1e-6, "endpoints must be zero");
        assert!((window[2] - 1.0).abs() < 1e-6, "center must be one");
        // symmetric
        assert!((window[1] - window[3]).abs() < 1e-6);
    }

    #[test]
    fn test_hamming_window_endpoints() {
        let window = make_hamming_window(8);
        // Hamming does not reach zero at the edges
        assert!(window[0] > 0.05 && window[0] < 0.15);
        assert!((window[0] - window[7]).abs() < 1e-6);
    }

    #[test]
    fn test_averages() {
        assert!((average([1.0, 2.0, 3.0]) - 2.0).abs() < 1e-6);
        assert_eq!(average(std::iter::empty()), 0.0);
        assert!((geometric_average([2.0, 8.0]) - 4.0).abs() < 1e-5);
        assert_eq!(geometric_average(std::iter::empty()), 0.0);
        // equal weights reduce to the plain geometric mean
        let weighted = weighted_geometric_average([(2.0, 1.0), (8.0, 1.0)]);
        assert!((weighted - 4.0).abs() < 1e-5);
        // all weight on one value returns that value
        let pinned = weighted_geometric_average([(2.0, 0.0), (8.0, 3.0)]);
        assert!((pinned - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_rms_and_peak() {
        let buffer = vec![0.5, -0.5, 0.5, -0.5];
        assert!((rms(&buffer) - 0.5).abs() < 0.001);
        assert!((peak(&[0.5, -0.8, 0.3]) - 0.8).abs() < 0.001);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_ring_push() {
        let mut buffer = vec![1.0, 2.0, 3.0, 4.0];
        ring_push(&mut buffer, &[5.0, 6.0]);
        assert_eq!(buffer, vec![3.0, 4.0, 5.0, 6.0]);

        // pushing more than fits keeps the trailing window
        ring_push(&mut buffer, &[7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(buffer, vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_ring_push_value() {
        let mut buffer = vec![1.0, 2.0, 3.0, 4.0];
        ring_push_value(&mut buffer, 0.0, 2);
        assert_eq!(buffer, vec![3.0, 4.0, 0.0, 0.0]);

        ring_push_value(&mut buffer, 9.0, 8);
        assert_eq!(buffer, vec![9.0; 4]);
    }

    #[test]
    fn test_sine_wave_generator() {
        let signal = make_sine_wave(1.0, 1000.0, 48000.0, 48);
        assert_eq!(signal.len(), 48);
        assert!(signal[0].abs() < 1e-6);
        // one full period at 48 samples per ms
        assert!(peak(&signal) > 0.99);
    }

    #[test]
    fn test_dirac_generator() {
        let signal = make_dirac(1.0, 16);
        assert_eq!(signal[0], 1.0);
        assert!(signal[1..].iter().all(|&s| s == 0.0));
    }
}
