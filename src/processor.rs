//! Top-level real-time pitch processor.
//!
//! Per block of `step_size` samples the processor analyzes the input stream
//! (windowed FFT, phase-delta refinement, peak grouping, fundamental
//! tracking) and synthesizes one pitched/formant-shifted output per channel
//! through the phase-propagating pitch shifter and windowed overlap-add.
//! All buffers are sized at construction; the audio path neither allocates
//! nor blocks.

use num_complex::Complex32;

use crate::envelope::{FrequencyEnvelope, TuningNoteEnvelope};
use crate::notes::{note_from_frequency, note_to_frequency, pitch_bend_to_semitones, Note};
use crate::pitch_shift::shift_pitch;
use crate::spectrum::{
    envelope_alignment_factors, find_fundamental, identify_frequencies_default,
    to_spectrum_by_phase, SpectrumValue, DEFAULT_MAX_FUNDAMENTAL_FREQUENCY,
    ZERO_GAIN_THRESHOLD_DB,
};
use crate::spectrum_swap::{spectrum_swap, AtomicF32, SpectrumConsumer, SpectrumProducer};
use crate::transform::{bin_frequency_step, nyquist_length, Algorithm, Transform};
use crate::utils::{
    db_to_linear, make_von_hann_window, ring_push, ring_push_value, semitones_to_factor,
};

// ============================================================================
// Constants
// ============================================================================

/// Scalar applied together with the synthesis window before overlap-add.
/// Empirical; compensates the gain of the analysis/synthesis window pair.
pub const DEFAULT_WINDOW_COMPENSATION: f32 = 0.7;

/// Share of the summed squared bin gains a fundamental candidate's harmonic
/// score must exceed. Empirical; treated as a tuning constant.
pub const FUNDAMENTAL_THRESHOLD_RATIO: f32 = 0.3;

/// Comparison tolerance for pitch/formant factor dispatch
const FACTOR_TOLERANCE: f32 = 1e-5;

#[inline]
fn nearly_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= FACTOR_TOLERANCE
}

// ============================================================================
// Error Types
// ============================================================================

/// Construction-time configuration failures. The audio path itself has no
/// user-visible error surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    FftLengthNotPowerOfTwo { fft_length: usize },
    OverSamplingTooSmall { over_sampling: usize },
    OverSamplingTooLarge { fft_length: usize, over_sampling: usize },
    FftLengthNotDivisible { fft_length: usize, over_sampling: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FftLengthNotPowerOfTwo { fft_length } => {
                write!(f, "fft length {} is not a power of two", fft_length)
            }
            ConfigError::OverSamplingTooSmall { over_sampling } => {
                write!(f, "over sampling {} must be greater than 1", over_sampling)
            }
            ConfigError::OverSamplingTooLarge { fft_length, over_sampling } => write!(
                f,
                "over sampling {} squared must stay below the fft length {}",
                over_sampling, fft_length
            ),
            ConfigError::FftLengthNotDivisible { fft_length, over_sampling } => write!(
                f,
                "fft length {} is not divisible by the over sampling {}",
                fft_length, over_sampling
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Parameters
// ============================================================================

/// Per-channel tuning target, resolved by the host's note source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TuningMode {
    /// Leave the pitch untouched
    #[default]
    None,
    /// Glide toward a target note; `midi_note_number < 0` infers the target
    /// from the detected input pitch
    AutoTune { midi_note_number: i32, pitch_bend: i32 },
    /// Glide toward an externally driven note; `midi_note_number < 0` means
    /// no note is active and the pitch stays untouched
    MidiTune { midi_note_number: i32, pitch_bend: i32 },
}

/// Global tuning behavior, all times in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningParameters {
    /// Reference frequency of A4 in Hz
    pub standard_pitch: f32,
    /// Averaging window of the fundamental envelope
    pub averaging_time: f32,
    /// How long a detection dropout is bridged
    pub hold_time: f32,
    /// Attack of the tuning-note glide
    pub attack_time: f32,
}

impl Default for TuningParameters {
    fn default() -> Self {
        Self {
            standard_pitch: 440.0,
            averaging_time: 0.005,
            hold_time: 0.01,
            attack_time: 0.005,
        }
    }
}

/// Per-output-channel transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelParameters {
    pub tuning: TuningMode,
    /// Pitch shift in semitones
    pub pitch_shift: f32,
    /// Formant shift in semitones
    pub formants_shift: f32,
    /// Linear output gain; zero silences and clears the channel
    pub mix_gain: f32,
}

// ============================================================================
// Channel State
// ============================================================================

/// Frame state of one analysis/synthesis stream
#[derive(Debug)]
struct ChannelState {
    tuning_envelope: TuningNoteEnvelope,
    coefficients: Vec<Complex32>,
    bin_spectrum: Vec<SpectrumValue>,
    phases: Vec<f32>,
    accumulator: Vec<f32>,
    spectrum: SpectrumProducer,
    fundamental_frequency: AtomicF32,
}

impl ChannelState {
    fn new(fft_length: usize) -> (Self, SpectrumConsumer) {
        let nyquist = nyquist_length(fft_length);
        let (producer, consumer) = spectrum_swap(nyquist);
        (
            Self {
                tuning_envelope: TuningNoteEnvelope::new(),
                coefficients: vec![Complex32::new(0.0, 0.0); nyquist],
                bin_spectrum: vec![SpectrumValue::default(); nyquist],
                phases: vec![0.0; nyquist],
                accumulator: vec![0.0; fft_length],
                spectrum: producer,
                fundamental_frequency: AtomicF32::default(),
            },
            consumer,
        )
    }

    fn clear(&mut self) {
        self.coefficients.fill(Complex32::new(0.0, 0.0));
        self.bin_spectrum.fill(SpectrumValue::default());
        self.phases.fill(0.0);
        self.accumulator.fill(0.0);
        self.spectrum.clear();
        self.fundamental_frequency.store(0.0);
    }

    /// Drop the DC bin and everything below the gain floor, then group the
    /// remainder into the staged snapshot of this stream's spectrum swap
    fn filter_spectrum(&mut self) {
        let bin_spectrum = &self.bin_spectrum;
        let threshold = db_to_linear(ZERO_GAIN_THRESHOLD_DB);
        self.spectrum.apply(|buffer| {
            buffer.clear();
            buffer.extend(
                bin_spectrum
                    .iter()
                    .skip(1)
                    .filter(|value| value.gain > threshold)
                    .copied(),
            );
            identify_frequencies_default(buffer);
        });
    }
}

// ============================================================================
// Tuning Factor
// ============================================================================

fn note_factor(
    note: Note,
    deviation: f32,
    tuning_parameters: &TuningParameters,
    input_fundamental: f32,
    envelope: &mut TuningNoteEnvelope,
    time_diff: f32,
) -> f32 {
    let envelope_factor = envelope.process(note, tuning_parameters.attack_time, time_diff);
    if input_fundamental <= 0.0 {
        return 1.0;
    }
    let note_frequency = note_to_frequency(note, tuning_parameters.standard_pitch, deviation);
    let tuned_frequency = 2.0_f32.powf(
        (1.0 - envelope_factor) * input_fundamental.log2()
            + envelope_factor * note_frequency.log2(),
    );
    tuned_frequency / input_fundamental
}

/// Frequency factor pulling the channel toward its tuning target
fn tuning_factor(
    mode: TuningMode,
    tuning_parameters: &TuningParameters,
    input_fundamental: f32,
    envelope: &mut TuningNoteEnvelope,
    time_diff: f32,
) -> f32 {
    match mode {
        TuningMode::None => 1.0,
        TuningMode::AutoTune { midi_note_number, pitch_bend } => {
            let note = if midi_note_number < 0 {
                note_from_frequency(input_fundamental, tuning_parameters.standard_pitch).0
            } else {
                Note::from_midi(midi_note_number)
            };
            note_factor(
                note,
                pitch_bend_to_semitones(pitch_bend),
                tuning_parameters,
                input_fundamental,
                envelope,
                time_diff,
            )
        }
        TuningMode::MidiTune { midi_note_number, pitch_bend } => {
            let note = if midi_note_number < 0 {
                Note::invalid()
            } else {
                Note::from_midi(midi_note_number)
            };
            note_factor(
                note,
                pitch_bend_to_semitones(pitch_bend),
                tuning_parameters,
                input_fundamental,
                envelope,
                time_diff,
            )
        }
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Real-time pitch/formant processor with `NUM_CHANNELS` independent
/// output channels
#[derive(Debug)]
pub struct PitchProcessor<const NUM_CHANNELS: usize> {
    fft_length: usize,
    over_sampling: usize,
    fft: Transform,

    input_state: ChannelState,
    channel_states: [ChannelState; NUM_CHANNELS],
    input_spectrum_tap: SpectrumConsumer,
    channel_spectrum_taps: [SpectrumConsumer; NUM_CHANNELS],

    frequency_envelope: FrequencyEnvelope,
    window_compensation: f32,

    // preallocated scratch
    signal_window: Vec<f32>,
    processing_signal: Vec<f32>,
    alignment_factors: Vec<f32>,
    reference_gains: Vec<f32>,
    channel_gains: Vec<f32>,
    formants_coefficients: Vec<Complex32>,
    formants_spectrum: Vec<SpectrumValue>,
    formants_phases: Vec<f32>,
}

impl<const NUM_CHANNELS: usize> PitchProcessor<NUM_CHANNELS> {
    /// Build a processor for the given FFT length and oversampling factor.
    /// The hop is `fft_length / over_sampling` samples.
    pub fn new(fft_length: usize, over_sampling: usize) -> Result<Self, ConfigError> {
        if !fft_length.is_power_of_two() {
            return Err(ConfigError::FftLengthNotPowerOfTwo { fft_length });
        }
        if over_sampling <= 1 {
            return Err(ConfigError::OverSamplingTooSmall { over_sampling });
        }
        if over_sampling * over_sampling >= fft_length {
            return Err(ConfigError::OverSamplingTooLarge { fft_length, over_sampling });
        }
        if fft_length % over_sampling != 0 {
            return Err(ConfigError::FftLengthNotDivisible { fft_length, over_sampling });
        }

        let nyquist = nyquist_length(fft_length);
        let (input_state, input_spectrum_tap) = ChannelState::new(fft_length);
        let mut taps = Vec::with_capacity(NUM_CHANNELS);
        let channel_states: [ChannelState; NUM_CHANNELS] = std::array::from_fn(|_| {
            let (state, tap) = ChannelState::new(fft_length);
            taps.push(tap);
            state
        });
        let channel_spectrum_taps: [SpectrumConsumer; NUM_CHANNELS] = match taps.try_into() {
            Ok(taps) => taps,
            Err(_) => unreachable!("one tap per channel"),
        };

        log::debug!(
            "pitch processor: fft_length={}, over_sampling={}, step_size={}, channels={}",
            fft_length,
            over_sampling,
            fft_length / over_sampling,
            NUM_CHANNELS
        );

        Ok(Self {
            fft_length,
            over_sampling,
            fft: Transform::new(Algorithm::Fft, fft_length),
            input_state,
            channel_states,
            input_spectrum_tap,
            channel_spectrum_taps,
            frequency_envelope: FrequencyEnvelope::new(),
            window_compensation: DEFAULT_WINDOW_COMPENSATION,
            signal_window: make_von_hann_window(fft_length),
            processing_signal: vec![0.0; fft_length],
            alignment_factors: vec![1.0; nyquist],
            reference_gains: Vec::with_capacity(nyquist),
            channel_gains: Vec::with_capacity(nyquist),
            formants_coefficients: vec![Complex32::new(0.0, 0.0); nyquist],
            formants_spectrum: vec![SpectrumValue::default(); nyquist],
            formants_phases: vec![0.0; nyquist],
        })
    }

    /// Default channel setup: channel 0 at unit mix gain, the rest silent
    pub fn default_channel_parameters() -> [ChannelParameters; NUM_CHANNELS] {
        std::array::from_fn(|channel| ChannelParameters {
            mix_gain: if channel == 0 { 1.0 } else { 0.0 },
            ..ChannelParameters::default()
        })
    }

    /// Process one hop of input into one hop of mixed output.
    /// Both slices must hold exactly `step_size` samples.
    pub fn process(
        &mut self,
        signal: &[f32],
        out_signal: &mut [f32],
        sample_rate: f32,
        tuning_parameters: &TuningParameters,
        channel_parameters: &[ChannelParameters; NUM_CHANNELS],
        dry_mix_gain: f32,
    ) {
        let step_size = self.step_size();
        let time_diff = step_size as f32 / sample_rate;
        let frequency_step = bin_frequency_step(self.fft_length, sample_rate);
        debug_assert_eq!(signal.len(), step_size);
        debug_assert_eq!(out_signal.len(), step_size);

        let Self {
            fft,
            input_state,
            channel_states,
            frequency_envelope,
            window_compensation,
            signal_window,
            processing_signal,
            alignment_factors,
            reference_gains,
            channel_gains,
            formants_coefficients,
            formants_spectrum,
            formants_phases,
            ..
        } = self;

        // input analysis
        ring_push(&mut input_state.accumulator, signal);
        for (out, &sample) in out_signal
            .iter_mut()
            .zip(input_state.accumulator[..step_size].iter())
        {
            *out = dry_mix_gain * sample;
        }

        for ((windowed, &window), &sample) in processing_signal
            .iter_mut()
            .zip(signal_window.iter())
            .zip(input_state.accumulator.iter())
        {
            *windowed = window * sample;
        }
        fft.transform_real(processing_signal, &mut input_state.coefficients, false);
        to_spectrum_by_phase(
            sample_rate,
            time_diff,
            &input_state.coefficients,
            &mut input_state.bin_spectrum,
            &mut input_state.phases,
        );
        input_state.filter_spectrum();

        let squared_threshold = FUNDAMENTAL_THRESHOLD_RATIO
            * input_state
                .bin_spectrum
                .iter()
                .map(|value| value.gain * value.gain)
                .sum::<f32>();
        let detected = find_fundamental(
            input_state.spectrum.staged(),
            squared_threshold,
            DEFAULT_MAX_FUNDAMENTAL_FREQUENCY,
        )
        .map_or(0.0, |value| value.frequency);
        let fundamental = frequency_envelope.process(
            detected,
            time_diff,
            tuning_parameters.averaging_time,
            tuning_parameters.hold_time,
        );
        input_state.fundamental_frequency.store(fundamental);
        input_state.spectrum.push();

        // per-channel synthesis
        for (parameters, state) in channel_parameters.iter().zip(channel_states.iter_mut()) {
            if parameters.mix_gain == 0.0 {
                state.clear();
                continue;
            }

            let pitch_factor = tuning_factor(
                parameters.tuning,
                tuning_parameters,
                fundamental,
                &mut state.tuning_envelope,
                time_diff,
            ) * semitones_to_factor(parameters.pitch_shift);
            state.fundamental_frequency.store(pitch_factor * fundamental);

            shift_pitch(
                pitch_factor,
                time_diff,
                frequency_step,
                &input_state.bin_spectrum,
                &input_state.phases,
                &mut state.coefficients,
                &mut state.bin_spectrum,
                &mut state.phases,
            );

            let formants_factor = semitones_to_factor(parameters.formants_shift);
            if !nearly_equal(pitch_factor, formants_factor) {
                let reference: &[SpectrumValue] = if nearly_equal(formants_factor, 1.0) {
                    &input_state.bin_spectrum
                } else {
                    shift_pitch(
                        formants_factor,
                        time_diff,
                        frequency_step,
                        &input_state.bin_spectrum,
                        &input_state.phases,
                        formants_coefficients,
                        formants_spectrum,
                        formants_phases,
                    );
                    formants_spectrum
                };

                reference_gains.clear();
                reference_gains.extend(reference.iter().map(|value| value.gain));
                channel_gains.clear();
                channel_gains.extend(state.bin_spectrum.iter().map(|value| value.gain));
                envelope_alignment_factors(reference_gains, channel_gains, alignment_factors);
                for ((coefficient, value), &factor) in state
                    .coefficients
                    .iter_mut()
                    .zip(state.bin_spectrum.iter_mut())
                    .zip(alignment_factors.iter())
                {
                    *coefficient *= factor;
                    value.gain *= factor;
                }
            }

            state.filter_spectrum();
            state.spectrum.push();

            // overlap-add synthesis
            fft.transform_inverse_real(&state.coefficients, processing_signal, false);
            for (sample, &window) in processing_signal.iter_mut().zip(signal_window.iter()) {
                *sample *= *window_compensation * window;
            }
            ring_push_value(&mut state.accumulator, 0.0, step_size);
            for (accumulated, &sample) in
                state.accumulator.iter_mut().zip(processing_signal.iter())
            {
                *accumulated += sample;
            }
            for (out, &accumulated) in out_signal
                .iter_mut()
                .zip(state.accumulator[..step_size].iter())
            {
                *out += parameters.mix_gain * accumulated;
            }
        }
    }

    /// Bypass processing: the input passes through delayed by
    /// `overlap_size` samples while all channel state is cleared
    pub fn process_bypassed(&mut self, signal: &[f32], out_signal: &mut [f32]) {
        let step_size = self.step_size();
        debug_assert_eq!(signal.len(), step_size);
        debug_assert_eq!(out_signal.len(), step_size);

        ring_push(&mut self.input_state.accumulator, signal);
        self.input_state.fundamental_frequency.store(0.0);
        self.input_state.spectrum.clear();

        for state in self.channel_states.iter_mut() {
            state.clear();
        }

        out_signal.copy_from_slice(&self.input_state.accumulator[..step_size]);
    }

    #[inline]
    pub fn fft_length(&self) -> usize {
        self.fft_length
    }

    #[inline]
    pub fn over_sampling(&self) -> usize {
        self.over_sampling
    }

    /// New samples per processing block
    #[inline]
    pub fn step_size(&self) -> usize {
        self.fft_length / self.over_sampling
    }

    /// Latency of the bypass path in samples
    #[inline]
    pub fn overlap_size(&self) -> usize {
        self.fft_length - self.step_size()
    }

    /// Latest published input spectrum (grouped, sorted by frequency)
    pub fn input_spectrum(&mut self) -> &[SpectrumValue] {
        self.input_spectrum_tap.pull()
    }

    /// Latest published spectrum of an output channel
    pub fn output_spectrum(&mut self, channel: usize) -> &[SpectrumValue] {
        self.channel_spectrum_taps[channel].pull()
    }

    /// Smoothed input fundamental; `<= 0` means none detected
    #[inline]
    pub fn in_fundamental_frequency(&self) -> f32 {
        self.input_state.fundamental_frequency.load()
    }

    /// Fundamental of an output channel after pitch transformation
    #[inline]
    pub fn out_fundamental_frequency(&self, channel: usize) -> f32 {
        self.channel_states[channel].fundamental_frequency.load()
    }

    /// Synthesis-window compensation scalar (see `DEFAULT_WINDOW_COMPENSATION`)
    #[inline]
    pub fn window_compensation(&self) -> f32 {
        self.window_compensation
    }

    pub fn set_window_compensation(&mut self, factor: f32) {
        self.window_compensation = factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{make_sine_wave, max_ratio, peak, rms, SQRT_SEMITONE_RATIO};

    const SAMPLE_RATE: f32 = 48000.0;
    const FFT_LENGTH: usize = 2048;
    const OVER_SAMPLING: usize = 4;

    fn make_processor() -> PitchProcessor<2> {
        PitchProcessor::<2>::new(FFT_LENGTH, OVER_SAMPLING).unwrap()
    }

    /// Feed `hops` blocks of `signal` and return the concatenated output
    fn run(
        processor: &mut PitchProcessor<2>,
        signal: &[f32],
        tuning: &TuningParameters,
        channels: &[ChannelParameters; 2],
        dry_mix_gain: f32,
    ) -> Vec<f32> {
        let step = processor.step_size();
        let hops = signal.len() / step;
        let mut out = Vec::with_capacity(hops * step);
        let mut block = vec![0.0; step];
        for hop in 0..hops {
            processor.process(
                &signal[hop * step..(hop + 1) * step],
                &mut block,
                SAMPLE_RATE,
                tuning,
                channels,
                dry_mix_gain,
            );
            out.extend_from_slice(&block);
        }
        out
    }

    fn spectrum_peak(spectrum: &[SpectrumValue]) -> SpectrumValue {
        spectrum
            .iter()
            .cloned()
            .max_by(|a, b| a.gain.total_cmp(&b.gain))
            .unwrap_or_default()
    }

    #[test]
    fn test_configuration_validation() {
        assert!(PitchProcessor::<2>::new(2048, 4).is_ok());
        assert_eq!(
            PitchProcessor::<2>::new(2000, 4).unwrap_err(),
            ConfigError::FftLengthNotPowerOfTwo { fft_length: 2000 }
        );
        assert_eq!(
            PitchProcessor::<2>::new(2048, 1).unwrap_err(),
            ConfigError::OverSamplingTooSmall { over_sampling: 1 }
        );
        assert_eq!(
            PitchProcessor::<2>::new(64, 8).unwrap_err(),
            ConfigError::OverSamplingTooLarge { fft_length: 64, over_sampling: 8 }
        );
        assert_eq!(
            PitchProcessor::<2>::new(2048, 3).unwrap_err(),
            ConfigError::FftLengthNotDivisible { fft_length: 2048, over_sampling: 3 }
        );
    }

    #[test]
    fn test_geometry_getters() {
        let processor = make_processor();
        assert_eq!(processor.fft_length(), 2048);
        assert_eq!(processor.over_sampling(), 4);
        assert_eq!(processor.step_size(), 512);
        assert_eq!(processor.overlap_size(), 1536);
    }

    #[test]
    fn test_default_channel_parameters() {
        let defaults = PitchProcessor::<2>::default_channel_parameters();
        assert_eq!(defaults[0].mix_gain, 1.0);
        assert_eq!(defaults[1].mix_gain, 0.0);
        assert_eq!(defaults[0].tuning, TuningMode::None);
        assert_eq!(defaults[0].pitch_shift, 0.0);
    }

    #[test]
    fn test_sine_passthrough_detects_fundamental() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = make_sine_wave(0.5, 440.0, SAMPLE_RATE, 12 * step);
        let tuning = TuningParameters::default();
        let channels = PitchProcessor::<2>::default_channel_parameters();

        let out = run(&mut processor, &signal, &tuning, &channels, 0.0);

        let fundamental = processor.in_fundamental_frequency();
        assert!(
            (fundamental - 440.0).abs() < 0.5,
            "input fundamental {} Hz",
            fundamental
        );

        let input_peak = spectrum_peak(processor.input_spectrum());
        assert!(
            (input_peak.frequency - 440.0).abs() < 2.0,
            "input peak at {} Hz",
            input_peak.frequency
        );

        let output_peak = spectrum_peak(processor.output_spectrum(0));
        assert!(
            max_ratio(output_peak.frequency, 440.0) < SQRT_SEMITONE_RATIO,
            "output peak at {} Hz",
            output_peak.frequency
        );

        // after warmup the channel carries signal
        let tail = &out[out.len() - 2 * step..];
        assert!(rms(tail) > 0.05, "output rms {}", rms(tail));
    }

    #[test]
    fn test_octave_up_shift() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = make_sine_wave(0.5, 440.0, SAMPLE_RATE, 12 * step);
        let tuning = TuningParameters::default();
        let mut channels = PitchProcessor::<2>::default_channel_parameters();
        // transpose formants along with the pitch: pure transposition
        channels[0].pitch_shift = 12.0;
        channels[0].formants_shift = 12.0;

        run(&mut processor, &signal, &tuning, &channels, 0.0);

        let input_peak = spectrum_peak(processor.input_spectrum());
        assert!(
            (input_peak.frequency - 440.0).abs() < 2.0,
            "input peak moved to {} Hz",
            input_peak.frequency
        );

        let output_peak = spectrum_peak(processor.output_spectrum(0));
        assert!(
            max_ratio(output_peak.frequency, 880.0) < SQRT_SEMITONE_RATIO,
            "output peak at {} Hz, expected 880",
            output_peak.frequency
        );
        assert!(
            (processor.out_fundamental_frequency(0) - 880.0).abs() < 5.0,
            "channel fundamental {}",
            processor.out_fundamental_frequency(0)
        );
    }

    #[test]
    fn test_bypass_delays_input_by_overlap() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let overlap = processor.overlap_size();
        let signal = make_sine_wave(0.8, 1000.0, SAMPLE_RATE, 10 * step);

        let mut out = Vec::new();
        let mut block = vec![0.0; step];
        for hop in 0..10 {
            processor.process_bypassed(&signal[hop * step..(hop + 1) * step], &mut block);
            out.extend_from_slice(&block);
        }

        for i in overlap..out.len() {
            assert_eq!(out[i], signal[i - overlap], "sample {}", i);
        }
        assert_eq!(processor.in_fundamental_frequency(), 0.0);
        assert_eq!(processor.out_fundamental_frequency(0), 0.0);
        assert!(processor.input_spectrum().is_empty());
        assert!(processor.output_spectrum(0).is_empty());
    }

    #[test]
    fn test_autotune_pulls_to_nearest_note() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = make_sine_wave(0.5, 445.0, SAMPLE_RATE, 30 * step);
        let tuning = TuningParameters {
            attack_time: 0.1,
            ..TuningParameters::default()
        };
        let mut channels = PitchProcessor::<2>::default_channel_parameters();
        channels[0].tuning = TuningMode::AutoTune { midi_note_number: -1, pitch_bend: 8192 };

        run(&mut processor, &signal, &tuning, &channels, 0.0);

        // the input stays off-pitch, the output settles on A4
        assert!((processor.in_fundamental_frequency() - 445.0).abs() < 1.0);
        let tuned = processor.out_fundamental_frequency(0);
        assert!((tuned - 440.0).abs() < 0.5, "tuned fundamental {} Hz", tuned);
    }

    #[test]
    fn test_midi_tune_to_octave() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = make_sine_wave(0.5, 440.0, SAMPLE_RATE, 30 * step);
        let tuning = TuningParameters {
            attack_time: 0.05,
            ..TuningParameters::default()
        };
        let mut channels = PitchProcessor::<2>::default_channel_parameters();
        // A5 = midi 81
        channels[0].tuning = TuningMode::MidiTune { midi_note_number: 81, pitch_bend: 8192 };

        run(&mut processor, &signal, &tuning, &channels, 0.0);

        let tuned = processor.out_fundamental_frequency(0);
        assert!((tuned - 880.0).abs() < 1.0, "tuned fundamental {} Hz", tuned);
    }

    #[test]
    fn test_midi_tune_without_note_is_neutral() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = make_sine_wave(0.5, 440.0, SAMPLE_RATE, 10 * step);
        let tuning = TuningParameters::default();
        let mut channels = PitchProcessor::<2>::default_channel_parameters();
        channels[0].tuning = TuningMode::MidiTune { midi_note_number: -1, pitch_bend: 8192 };

        run(&mut processor, &signal, &tuning, &channels, 0.0);

        let fundamental = processor.out_fundamental_frequency(0);
        assert!((fundamental - 440.0).abs() < 1.0, "fundamental {}", fundamental);
    }

    #[test]
    fn test_silence_yields_silence() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = vec![0.0; 10 * step];
        let tuning = TuningParameters::default();
        let channels = PitchProcessor::<2>::default_channel_parameters();

        let out = run(&mut processor, &signal, &tuning, &channels, 0.5);

        assert_eq!(processor.in_fundamental_frequency(), 0.0);
        assert!(peak(&out) <= 1e-7, "output peak {}", peak(&out));
    }

    #[test]
    fn test_zero_mix_gain_clears_channel() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = make_sine_wave(0.5, 440.0, SAMPLE_RATE, 8 * step);
        let tuning = TuningParameters::default();

        // first run the channel hot, then silence it
        let channels = PitchProcessor::<2>::default_channel_parameters();
        run(&mut processor, &signal, &tuning, &channels, 0.0);
        assert!(processor.out_fundamental_frequency(0) > 0.0);

        let mut muted = channels;
        muted[0].mix_gain = 0.0;
        let out = run(&mut processor, &signal, &tuning, &muted, 0.0);

        assert_eq!(processor.out_fundamental_frequency(0), 0.0);
        assert!(processor.output_spectrum(0).is_empty());
        assert!(peak(&out) <= 1e-7, "muted output peak {}", peak(&out));
    }

    #[test]
    fn test_dry_mix_passes_delayed_input() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let overlap = processor.overlap_size();
        let signal = make_sine_wave(0.5, 440.0, SAMPLE_RATE, 8 * step);
        let tuning = TuningParameters::default();
        let mut channels = PitchProcessor::<2>::default_channel_parameters();
        channels[0].mix_gain = 0.0;

        let out = run(&mut processor, &signal, &tuning, &channels, 1.0);

        for i in overlap..out.len() {
            assert!(
                (out[i] - signal[i - overlap]).abs() < 1e-6,
                "sample {}: {} vs {}",
                i,
                out[i],
                signal[i - overlap]
            );
        }
    }

    #[test]
    fn test_formant_preservation_on_harmonic_signal() {
        // a harmonic-rich tone exercises the envelope alignment paths:
        // formant factor 1 aligns against the input envelope, a distinct
        // factor against the shifted reference
        let mut processor = make_processor();
        let step = processor.step_size();
        let partials: Vec<f32> = (0..12 * step)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                (1..=5).map(|h| {
                    0.15 * (std::f32::consts::TAU * 220.0 * h as f32 * t).sin() / h as f32
                }).sum::<f32>()
            })
            .collect();
        let tuning = TuningParameters::default();
        let mut channels = PitchProcessor::<2>::default_channel_parameters();
        channels[0].pitch_shift = 12.0;
        channels[1].mix_gain = 1.0;
        channels[1].pitch_shift = 12.0;
        channels[1].formants_shift = 5.0;

        run(&mut processor, &partials, &tuning, &channels, 0.0);

        assert!((processor.in_fundamental_frequency() - 220.0).abs() < 1.0);
        for channel in 0..2 {
            let fundamental = processor.out_fundamental_frequency(channel);
            assert!(
                (fundamental - 440.0).abs() < 5.0,
                "channel {} fundamental {} Hz",
                channel,
                fundamental
            );
            assert!(
                processor
                    .output_spectrum(channel)
                    .iter()
                    .all(|v| v.frequency.is_finite() && v.gain.is_finite()),
                "channel {} spectrum must stay finite",
                channel
            );
        }
    }

    #[test]
    fn test_window_compensation_is_adjustable() {
        let mut processor = make_processor();
        assert_eq!(processor.window_compensation(), DEFAULT_WINDOW_COMPENSATION);
        processor.set_window_compensation(0.6);
        assert_eq!(processor.window_compensation(), 0.6);
    }

    #[test]
    fn test_second_channel_mixes_in() {
        let mut processor = make_processor();
        let step = processor.step_size();
        let signal = make_sine_wave(0.4, 440.0, SAMPLE_RATE, 12 * step);
        let tuning = TuningParameters::default();
        let mut channels = PitchProcessor::<2>::default_channel_parameters();
        channels[1].mix_gain = 1.0;
        channels[1].pitch_shift = 12.0;
        channels[1].formants_shift = 12.0;

        run(&mut processor, &signal, &tuning, &channels, 0.0);

        let first = spectrum_peak(processor.output_spectrum(0));
        let second = spectrum_peak(processor.output_spectrum(1));
        assert!(max_ratio(first.frequency, 440.0) < SQRT_SEMITONE_RATIO);
        assert!(max_ratio(second.frequency, 880.0) < SQRT_SEMITONE_RATIO);
        assert!((processor.out_fundamental_frequency(1) - 880.0).abs() < 5.0);
    }
}
