//! Phase bookkeeping for the phase-vocoder pipeline.
//!
//! All phases handed between analysis hops live in the half-open interval
//! `(-π, π]`; `standardize` folds arbitrary angles back into that range.

use std::f32::consts::{PI, TAU};

/// Phase advance of a sinusoid at `frequency` over `time_diff` seconds
#[inline]
pub fn phase_angle(frequency: f32, time_diff: f32) -> f32 {
    frequency * time_diff * TAU
}

/// Frequency whose phase advance over `time_diff` seconds equals `angle`
#[inline]
pub fn frequency_of(angle: f32, time_diff: f32) -> f32 {
    angle / (time_diff * TAU)
}

/// Fold an arbitrary angle into `(-π, π]`
#[inline]
pub fn standardize(angle: f32) -> f32 {
    let wrapped = angle - (angle / TAU).floor() * TAU;
    if wrapped <= PI {
        wrapped
    } else {
        wrapped - TAU
    }
}

/// Advance each phase by its frequency over `time_diff`, folding the results
/// back into `(-π, π]`. Phases and frequencies must have equal length.
pub fn advance_phases(phases: &mut [f32], frequencies: &[f32], time_diff: f32) {
    debug_assert_eq!(phases.len(), frequencies.len());
    for (phase, &frequency) in phases.iter_mut().zip(frequencies.iter()) {
        *phase = standardize(*phase + phase_angle(frequency, time_diff));
    }
}
