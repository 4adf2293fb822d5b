//! Time smoothing of the detected fundamental and the per-channel tuning
//! attack ramp.

use std::collections::VecDeque;
use std::f32::consts::PI;

use crate::notes::Note;
use crate::utils::geometric_average;

/// Smooths the detected fundamental over successive hops with a geometric
/// mean, bridging short dropouts by holding the last emitted value.
#[derive(Debug)]
pub struct FrequencyEnvelope {
    buffer: VecDeque<f32>,
    hold_count: usize,
    out: f32,
}

impl FrequencyEnvelope {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(100),
            hold_count: 0,
            out: 0.0,
        }
    }

    /// Feed one detection (`<= 0` means none) and get the smoothed value.
    /// The averaging window spans `round(averaging_time/time_diff) + 1`
    /// hops; dropouts are held for up to `round(hold_time/time_diff)` hops.
    pub fn process(
        &mut self,
        detected_frequency: f32,
        time_diff: f32,
        averaging_time: f32,
        hold_time: f32,
    ) -> f32 {
        debug_assert!(time_diff > 0.0);
        debug_assert!(averaging_time >= 0.0);
        debug_assert!(hold_time >= 0.0);

        if detected_frequency > 0.0 {
            self.buffer.push_back(detected_frequency);
            self.hold_count = 0;
        } else if self.hold_count < (hold_time / time_diff).round() as usize {
            self.buffer.push_back(self.out);
            self.hold_count += 1;
        } else {
            self.buffer.push_back(0.0);
            self.hold_count = 0;
        }

        let window = (averaging_time / time_diff).round() as usize + 1;
        while self.buffer.len() > window {
            self.buffer.pop_front();
        }

        self.out = if self.buffer.iter().all(|&v| v == 0.0) {
            0.0
        } else {
            geometric_average(self.buffer.iter().copied().filter(|&v| v != 0.0))
        };
        self.out
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.hold_count = 0;
        self.out = 0.0;
    }
}

impl Default for FrequencyEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine ramp gliding from 0 to 1 over `attack_time` seconds while the
/// target note stays identical and valid; any change resets the ramp.
#[derive(Debug)]
pub struct TuningNoteEnvelope {
    current_note: Note,
    elapsed: f32,
}

impl TuningNoteEnvelope {
    pub fn new() -> Self {
        Self {
            current_note: Note::default(),
            elapsed: 0.0,
        }
    }

    pub fn process(&mut self, note: Note, attack_time: f32, time_diff: f32) -> f32 {
        debug_assert!(attack_time >= 0.0);
        debug_assert!(time_diff > 0.0);

        if !note.is_valid() || note != self.current_note {
            self.elapsed = 0.0;
        } else {
            self.elapsed += time_diff;
        }
        self.current_note = note;

        if self.elapsed < attack_time {
            0.5 - 0.5 * (PI * self.elapsed / attack_time).cos()
        } else {
            1.0
        }
    }
}

impl Default for TuningNoteEnvelope {
    fn default() -> Self {
        Self::new()
    }
}
