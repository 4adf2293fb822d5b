//! Musical note representation and the conversions between frequencies,
//! MIDI note numbers and equal-tempered pitches.

use crate::utils::{factor_to_semitones, max_ratio, semitones_to_factor, SQRT_SEMITONE_RATIO};

/// Note names of the chromatic scale; `Invalid` marks "no active note"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NoteName {
    C = 0,
    CSharp = 1,
    D = 2,
    DSharp = 3,
    E = 4,
    F = 5,
    FSharp = 6,
    G = 7,
    GSharp = 8,
    A = 9,
    ASharp = 10,
    B = 11,
    Invalid = 12,
}

impl NoteName {
    /// Chromatic index 0..=11, or 12 for `Invalid`
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    fn from_index(index: u8) -> Self {
        match index {
            0 => NoteName::C,
            1 => NoteName::CSharp,
            2 => NoteName::D,
            3 => NoteName::DSharp,
            4 => NoteName::E,
            5 => NoteName::F,
            6 => NoteName::FSharp,
            7 => NoteName::G,
            8 => NoteName::GSharp,
            9 => NoteName::A,
            10 => NoteName::ASharp,
            11 => NoteName::B,
            _ => NoteName::Invalid,
        }
    }
}

/// Display labels, indexed by chromatic index; empty for `Invalid`
pub const NOTE_LABELS: [&str; 13] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B", "",
];

/// A note of the equal-tempered scale: name plus octave (A4 = 440 Hz at
/// standard pitch 440)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub name: NoteName,
    pub octave: i32,
}

impl Default for Note {
    fn default() -> Self {
        Note { name: NoteName::A, octave: 4 }
    }
}

impl Note {
    pub const fn new(name: NoteName, octave: i32) -> Self {
        Note { name, octave }
    }

    /// The "no active note" marker
    pub const fn invalid() -> Self {
        Note { name: NoteName::Invalid, octave: 0 }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.name != NoteName::Invalid
    }

    /// MIDI note number; C-1 maps to 0, A4 to 69
    #[inline]
    pub fn to_midi(&self) -> i32 {
        (self.octave + 1) * 12 + i32::from(self.name.index())
    }

    /// Note for a MIDI note number
    pub fn from_midi(midi: i32) -> Self {
        Note {
            name: NoteName::from_index(midi.rem_euclid(12) as u8),
            octave: midi.div_euclid(12) - 1,
        }
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{} {}", NOTE_LABELS[self.name.index() as usize], self.octave)
        } else {
            Ok(())
        }
    }
}

/// Frequency of a note at the given standard pitch (A4), with an optional
/// fractional deviation in semitones
pub fn note_to_frequency(note: Note, standard_pitch: f32, semitone_deviation: f32) -> f32 {
    let diff_semitones = (note.to_midi() - 69) as f32 + semitone_deviation;
    standard_pitch * semitones_to_factor(diff_semitones)
}

/// Nearest note for a frequency, together with the remaining deviation in
/// semitones (always in [-0.5, 0.5]). Non-positive frequencies map to the
/// invalid note.
pub fn note_from_frequency(frequency: f32, standard_pitch: f32) -> (Note, f32) {
    if frequency <= 0.0 || standard_pitch <= 0.0 {
        return (Note::invalid(), 0.0);
    }
    let diff_semitones = factor_to_semitones(frequency / standard_pitch);
    let rounded = diff_semitones.round();
    (Note::from_midi(69 + rounded as i32), diff_semitones - rounded)
}

/// MIDI pitch-bend value (0..16383, 8192 neutral) to semitones; the full
/// bend range spans ±2 semitones
#[inline]
pub fn pitch_bend_to_semitones(pitch_bend: i32) -> f32 {
    2.0 * (pitch_bend - 8192) as f32 / 8192.0
}

/// Whether `other_frequency` lies within `ratio_tolerance` of an integer
/// multiple of `fundamental_frequency`
pub fn is_harmonic(fundamental_frequency: f32, other_frequency: f32, ratio_tolerance: f32) -> bool {
    let multiple = (other_frequency / fundamental_frequency).round();
    if multiple < 1.0 {
        return false;
    }
    max_ratio(multiple * fundamental_frequency, other_frequency) <= ratio_tolerance
}

/// Default harmonic tolerance: half a semitone on either side
#[inline]
pub fn is_harmonic_default(fundamental_frequency: f32, other_frequency: f32) -> bool {
    is_harmonic(fundamental_frequency, other_frequency, SQRT_SEMITONE_RATIO)
}
