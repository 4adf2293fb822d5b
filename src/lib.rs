//! Real-time monophonic pitch and formant transformation core.
//!
//! A phase-vocoder pipeline for live audio: overlapping short-time Fourier
//! analysis with phase-delta frequency refinement, harmonic fundamental
//! tracking, per-channel pitch shifting with phase-coherent re-synthesis,
//! formant envelope alignment, auto-tune glides toward target notes and
//! windowed overlap-add reconstruction. A lock-free spectrum swap exposes
//! the latest analyzed spectra to a visualization thread while the audio
//! thread keeps processing.

/// Fundamental and tuning-note smoothing envelopes
pub mod envelope;
/// Musical notes, MIDI mapping and pitch conversions
pub mod notes;
/// Phase folding and propagation helpers
pub mod phases;
/// Spectral pitch shifting with per-bin phase propagation
pub mod pitch_shift;
/// Top-level per-block pitch processor
pub mod processor;
/// Spectrum refinement, peak grouping, fundamental estimation and formant
/// alignment
pub mod spectrum;
/// SPSC spectrum sharing for visualization threads
pub mod spectrum_swap;
/// DFT/FFT engine on preallocated swap buffers
pub mod transform;
/// Windows, gain conversions, averages and accumulator operations
pub mod utils;

pub use notes::{Note, NoteName};
pub use processor::{
    ChannelParameters, ConfigError, PitchProcessor, TuningMode, TuningParameters,
    DEFAULT_WINDOW_COMPENSATION, FUNDAMENTAL_THRESHOLD_RATIO,
};
pub use spectrum::SpectrumValue;
pub use spectrum_swap::{spectrum_swap, AtomicF32, SpectrumConsumer, SpectrumProducer};
pub use transform::{Algorithm, Transform};
