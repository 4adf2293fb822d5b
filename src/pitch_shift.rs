//! Spectral pitch shifting with per-bin phase propagation.
//!
//! Each target bin accumulates the source bins that fall into its half-bin
//! pre-image under the pitch map. Contributions are re-synthesized at the
//! shifted frequency from the target's own phase memory, which keeps the
//! synthesized partials phase-coherent across hops.

use num_complex::Complex32;

use crate::phases::{phase_angle, standardize};
use crate::spectrum::{corrected_frequency, SpectrumValue};

/// Lower clamp for the phase-alignment cosine. Bounds the gain correction
/// applied when a contribution lands out of phase with the source bin,
/// preventing blow-ups near phase opposition.
pub const PHASE_ALIGNMENT_FLOOR: f32 = 0.7;

/// One source contribution, re-synthesized at `frequency` on top of the
/// target bin's previous phase
fn shifted(last_phase: f32, reference_phase: f32, frequency: f32, gain: f32, time_diff: f32) -> Complex32 {
    let new_phase = standardize(last_phase + phase_angle(frequency, time_diff));
    let alignment = (reference_phase - new_phase).cos();
    let scale = 1.0 / alignment.abs().max(PHASE_ALIGNMENT_FLOOR);
    Complex32::from_polar((scale * gain).min(1.0), new_phase)
}

/// Synthesize the pitch-shifted one-sided spectrum of an analysis frame.
///
/// `in_spectrum`/`in_phases` describe the refined source frame;
/// `out_phases` carries the target stream's phase memory across hops and is
/// updated in place. `frequency_step` is the nominal bin spacing
/// (sample rate / fft length). The written coefficients are scaled by
/// `K - 1`, canceling the `2/N` analysis gain so the inverse transform
/// yields correctly scaled samples. On return the DC and Nyquist
/// coefficients are purely real, as the one-sided inverse requires.
#[allow(clippy::too_many_arguments)]
pub fn shift_pitch(
    pitch_factor: f32,
    time_diff: f32,
    frequency_step: f32,
    in_spectrum: &[SpectrumValue],
    in_phases: &[f32],
    out_coefficients: &mut [Complex32],
    out_spectrum: &mut [SpectrumValue],
    out_phases: &mut [f32],
) {
    let nyquist = in_spectrum.len();
    debug_assert!(pitch_factor > 0.0);
    debug_assert_eq!(nyquist, in_phases.len());
    debug_assert_eq!(nyquist, out_coefficients.len());
    debug_assert_eq!(nyquist, out_spectrum.len());
    debug_assert_eq!(nyquist, out_phases.len());

    let coefficient_scale = (nyquist - 1) as f32;

    for i in 0..nyquist {
        let begin = (((i as f32 - 0.5) / pitch_factor).ceil().max(0.0) as usize).min(nyquist);
        let end = (((i as f32 + 0.5) / pitch_factor).ceil().max(0.0) as usize).min(nyquist);
        let last_phase = out_phases[i];

        let mut coefficient = Complex32::new(0.0, 0.0);
        for j in begin..end {
            coefficient += shifted(
                last_phase,
                in_phases[j],
                pitch_factor * in_spectrum[j].frequency,
                in_spectrum[j].gain,
                time_diff,
            );
        }

        let gain = coefficient.norm();
        let phase = if gain > 0.0 { coefficient.arg() } else { in_phases[i] };
        let frequency = corrected_frequency(last_phase, phase, time_diff, i as f32 * frequency_step);

        out_coefficients[i] = coefficient_scale * coefficient;
        out_spectrum[i] = SpectrumValue::new(frequency, gain);
        out_phases[i] = phase;
    }

    // rotate the endpoints onto the real axis for the one-sided inverse
    let dc = out_coefficients[0];
    out_coefficients[0] = Complex32::new(dc.norm(), 0.0);
    out_phases[0] = 0.0;
    let nyquist_bin = out_coefficients[nyquist - 1];
    out_coefficients[nyquist - 1] = Complex32::new(nyquist_bin.norm(), 0.0);
    out_phases[nyquist - 1] = 0.0;
}
