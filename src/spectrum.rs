//! Spectral analysis on one-sided bin data: phase-delta frequency
//! refinement, peak grouping into an identifiable spectrum, fundamental
//! estimation by harmonic scoring and formant envelope alignment.

use num_complex::Complex32;

use crate::notes::is_harmonic;
use crate::phases::{frequency_of, phase_angle, standardize};
use crate::utils::{average, db_to_linear, max_ratio, weighted_geometric_average, SEMITONE_RATIO};

// ============================================================================
// Constants
// ============================================================================

/// Gains below this linear threshold are dropped before peak grouping
pub const ZERO_GAIN_THRESHOLD_DB: f32 = -60.0;

/// Below this peak gain the fundamental estimator reports silence
pub const SILENCE_FLOOR_DB: f32 = -120.0;

/// Fundamental candidates must reach this share of the strongest gain
pub const CANDIDATE_GAIN_RATIO: f32 = 0.6;

/// Upper bound for detectable fundamentals
pub const DEFAULT_MAX_FUNDAMENTAL_FREQUENCY: f32 = 5000.0;

/// Symmetric 21-tap smoothing kernel for the formant gain envelope.
/// Empirical; treated as a tuning constant.
pub const FORMANT_SMOOTHING_KERNEL: [f32; 21] = [
    0.0180, 0.0243, 0.0310, 0.0378, 0.0445, 0.0508, 0.0564, 0.0611, 0.0646, 0.0667, 0.0675,
    0.0667, 0.0646, 0.0611, 0.0564, 0.0508, 0.0445, 0.0378, 0.0310, 0.0243, 0.0180,
];

// ============================================================================
// Spectrum Values
// ============================================================================

/// One spectral line: non-negative frequency in Hz and non-negative linear gain
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectrumValue {
    pub frequency: f32,
    pub gain: f32,
}

impl SpectrumValue {
    pub const fn new(frequency: f32, gain: f32) -> Self {
        Self { frequency, gain }
    }
}

// ============================================================================
// Phase-Delta Refinement
// ============================================================================

/// Estimate a bin's true frequency from the phase advance between two
/// consecutive analysis hops
pub fn corrected_frequency(
    last_phase: f32,
    coefficient_phase: f32,
    time_diff: f32,
    bin_frequency: f32,
) -> f32 {
    let expected_angle = phase_angle(bin_frequency, time_diff);
    let expected_phase = standardize(last_phase + expected_angle);
    let phase_diff = standardize(coefficient_phase - expected_phase);
    frequency_of(expected_angle + phase_diff, time_diff).abs()
}

/// Refine raw bin coefficients into `(frequency, gain)` pairs using the
/// per-bin phase memory, overwriting `phases` with the current coefficient
/// phases. Gains are single-sided amplitudes (|C|·2/N).
pub fn to_spectrum_by_phase(
    sample_rate: f32,
    time_diff: f32,
    coefficients: &[Complex32],
    spectrum: &mut [SpectrumValue],
    phases: &mut [f32],
) {
    debug_assert!(coefficients.len() > 1);
    debug_assert_eq!(coefficients.len(), spectrum.len());
    debug_assert_eq!(coefficients.len(), phases.len());

    let half_signal_length = coefficients.len() - 1;
    let gain_factor = 1.0 / half_signal_length as f32;
    let frequency_step = sample_rate / (2 * half_signal_length) as f32;

    for (k, (coefficient, (value, phase))) in coefficients
        .iter()
        .zip(spectrum.iter_mut().zip(phases.iter_mut()))
        .enumerate()
    {
        let coefficient_phase = coefficient.arg();
        let bin_frequency = k as f32 * frequency_step;
        *value = SpectrumValue {
            frequency: corrected_frequency(*phase, coefficient_phase, time_diff, bin_frequency),
            gain: gain_factor * coefficient.norm(),
        };
        *phase = coefficient_phase;
    }
}

// ============================================================================
// Peak Grouping
// ============================================================================

/// Drop spectrum entries whose gain does not exceed `min_gain` (linear)
pub fn remove_small_gains(spectrum: &mut Vec<SpectrumValue>, min_gain: f32) {
    spectrum.retain(|value| value.gain > min_gain);
}

/// Collapse a run of adjacent entries into a single spectral line. The gain
/// is the root of the summed squared gains; the frequency is the
/// gain-weighted geometric mean, falling back to the arithmetic mean when
/// the run carries no energy.
fn to_one_spectrum_value(group: &[SpectrumValue]) -> SpectrumValue {
    match group {
        [] => SpectrumValue::default(),
        [single] => *single,
        _ => {
            let gain = group.iter().map(|v| v.gain * v.gain).sum::<f32>().sqrt();
            let frequency = if gain == 0.0 {
                average(group.iter().map(|v| v.frequency))
            } else {
                weighted_geometric_average(group.iter().map(|v| (v.frequency, v.gain)))
            };
            SpectrumValue { frequency, gain }
        }
    }
}

/// Merge maximal runs of adjacent entries whose frequencies lie within
/// `ratio_tolerance` of their neighbor into single spectral lines, in place.
/// The input is expected sorted by frequency unless `sort` is set.
pub fn identify_frequencies(
    spectrum: &mut Vec<SpectrumValue>,
    ratio_tolerance: f32,
    sort: bool,
) {
    if spectrum.len() < 2 {
        return;
    }
    if sort {
        spectrum.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    }

    let mut merge_start = 0usize;
    let mut write = 0usize;
    for i in 1..spectrum.len() {
        if max_ratio(spectrum[i].frequency, spectrum[i - 1].frequency) > ratio_tolerance {
            spectrum[write] = to_one_spectrum_value(&spectrum[merge_start..i]);
            write += 1;
            merge_start = i;
        }
    }
    spectrum[write] = to_one_spectrum_value(&spectrum[merge_start..]);
    spectrum.truncate(write + 1);
}

/// Peak grouping with the default one-semitone ratio tolerance
pub fn identify_frequencies_default(spectrum: &mut Vec<SpectrumValue>) {
    identify_frequencies(spectrum, SEMITONE_RATIO, false);
}

// ============================================================================
// Fundamental Estimation
// ============================================================================

/// Pick the fundamental of a grouped spectrum by harmonic scoring: each
/// candidate near the peak gain accumulates the squared gains of all later
/// entries lying within a semitone of one of its integer multiples. The
/// best score must exceed `squared_gain_threshold` and the winning
/// frequency must not exceed `max_frequency`. Ties go to the lowest
/// candidate frequency.
pub fn find_fundamental(
    spectrum: &[SpectrumValue],
    squared_gain_threshold: f32,
    max_frequency: f32,
) -> Option<SpectrumValue> {
    let max_gain = spectrum
        .iter()
        .map(|v| v.gain)
        .fold(0.0_f32, f32::max);
    if max_gain <= db_to_linear(SILENCE_FLOOR_DB) {
        return None;
    }

    let candidate_floor = CANDIDATE_GAIN_RATIO * max_gain;
    let mut best: Option<SpectrumValue> = None;
    let mut best_score = squared_gain_threshold;

    for (i, candidate) in spectrum.iter().enumerate() {
        if candidate.gain < candidate_floor || candidate.frequency > max_frequency {
            continue;
        }
        let mut score = candidate.gain * candidate.gain;
        for value in &spectrum[i + 1..] {
            if is_harmonic(candidate.frequency, value.frequency, SEMITONE_RATIO) {
                score += value.gain * value.gain;
            }
        }
        if score > best_score {
            best_score = score;
            best = Some(*candidate);
        }
    }

    best
}

// ============================================================================
// Formant Envelope Alignment
// ============================================================================

/// Smoothed gain envelope at bin `i`: inner product of the clipped 21-tap
/// kernel window with the surrounding gains
fn envelope_value(gains: &[f32], i: usize) -> f32 {
    let offset = FORMANT_SMOOTHING_KERNEL.len() / 2;
    let start = i.saturating_sub(offset);
    let end = (i + offset + 1).min(gains.len());
    let kernel_start = start + offset - i;

    gains[start..end]
        .iter()
        .zip(FORMANT_SMOOTHING_KERNEL[kernel_start..].iter())
        .map(|(&g, &c)| g * c)
        .sum()
}

/// Multiplicative per-bin factors that equalize the smoothed envelope of
/// `gains_to_align` to the smoothed envelope of `reference_gains`. Bins
/// whose own envelope vanishes get factor 1.
pub fn envelope_alignment_factors(
    reference_gains: &[f32],
    gains_to_align: &[f32],
    factors: &mut [f32],
) {
    debug_assert_eq!(reference_gains.len(), gains_to_align.len());
    debug_assert_eq!(reference_gains.len(), factors.len());

    for (i, factor) in factors.iter_mut().enumerate() {
        let envelope_to_align = envelope_value(gains_to_align, i);
        *factor = if envelope_to_align == 0.0 {
            1.0
        } else {
            envelope_value(reference_gains, i) / envelope_to_align
        };
    }
}
