//! # Musical Tuning Module
//!
//! Maps frequencies onto the twelve-tone equal-tempered scale and measures
//! how far a pitch sits from its nearest note.
//!
//! ## Conventions
//! - Notes use scientific pitch notation with sharps: `A4`, `C#3`.
//! - A4 is the reference note; its frequency is configurable (440 Hz by
//!   default).
//! - Offsets are positive when sharp and negative when flat.
//! - A pitch exactly half a semitone between two notes belongs to the lower
//!   note, so offsets always fall in `(-50, 50]` cents.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::NoteError;
use crate::pitch::PitchEstimate;

/// Note names of one octave, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// MIDI number of A4.
const A4_MIDI: i32 = 69;

/// An equal-tempered note, stored as semitones from A4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Note {
    index: i32,
}

impl Note {
    pub const A4: Note = Note { index: 0 };

    /// The note `index` semitones above (or below, when negative) A4.
    pub fn from_index(index: i32) -> Self {
        Self { index }
    }

    pub fn from_midi(midi: i32) -> Self {
        Self {
            index: midi - A4_MIDI,
        }
    }

    /// Semitones from A4.
    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn midi(&self) -> i32 {
        self.index + A4_MIDI
    }

    /// Position within the octave, 0 for C through 11 for B.
    pub fn pitch_class(&self) -> usize {
        self.midi().rem_euclid(12) as usize
    }

    pub fn name(&self) -> &'static str {
        NOTE_NAMES[self.pitch_class()]
    }

    /// Octave number; octaves change at C.
    pub fn octave(&self) -> i32 {
        self.midi().div_euclid(12) - 1
    }

    /// Ideal equal-tempered frequency given the A4 reference.
    pub fn frequency(&self, reference_hz: f32) -> f32 {
        (reference_hz as f64 * 2f64.powf(self.index as f64 / 12.0)) as f32
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.octave())
    }
}

impl Serialize for Note {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Note {
    type Err = NoteError;

    /// Parses names like `A4`, `c#3`, `Bb2` or `C-1`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || NoteError::InvalidName(name.to_string());
        let mut chars = name.trim().chars();

        let letter = chars.next().ok_or_else(invalid)?;
        let pitch_class: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
            (1, octave)
        } else if let Some(octave) = rest.strip_prefix('b') {
            (-1, octave)
        } else {
            (0, rest)
        };

        let octave: i32 = octave.parse().map_err(|_| invalid())?;
        let index = octave
            .checked_add(1)
            .and_then(|o| o.checked_mul(12))
            .and_then(|m| m.checked_add(pitch_class + accidental))
            .and_then(|midi| midi.checked_sub(A4_MIDI))
            .ok_or_else(invalid)?;
        Ok(Note::from_index(index))
    }
}

/// How a pitch sits relative to its nearest note.
///
/// The percentage scales the half-semitone span to 100: a pitch a quarter
/// tone sharp is `+100%`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Offset {
    pub cents: f32,
    pub percentage: f32,
}

impl Offset {
    pub fn from_cents(cents: f32) -> Self {
        Self {
            cents,
            percentage: cents / 50.0 * 100.0,
        }
    }

    pub fn accuracy(&self) -> TuningAccuracy {
        TuningAccuracy::from_cents(self.cents)
    }
}

/// Coarse tuning feedback for displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningAccuracy {
    /// Within 5 cents.
    InTune,
    /// Within 25 cents.
    Close,
    Off,
}

impl TuningAccuracy {
    pub fn from_cents(cents: f32) -> Self {
        match cents.abs() {
            c if c <= 5.0 => Self::InTune,
            c if c <= 25.0 => Self::Close,
            _ => Self::Off,
        }
    }
}

/// Splits a fractional semitone distance into the nearest note index and the
/// remainder in cents.
///
/// Exact halves resolve downwards: `0.5` gives note 0 at +50 cents and
/// `-0.5` gives note -1 at +50 cents.
fn split_semitones(semitones: f64) -> (i32, f64) {
    let nearest = (semitones - 0.5).ceil();
    (nearest as i32, 100.0 * (semitones - nearest))
}

/// Maps frequencies onto notes for a given A4 reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteMapper {
    reference_hz: f32,
}

impl NoteMapper {
    pub fn new(reference_hz: f32) -> Result<Self, NoteError> {
        if !(reference_hz.is_finite() && reference_hz > 0.0) {
            return Err(NoteError::InvalidFrequency(reference_hz));
        }
        Ok(Self { reference_hz })
    }

    pub fn reference_hz(&self) -> f32 {
        self.reference_hz
    }

    /// Finds the nearest note to `frequency` and the offset from it.
    ///
    /// # Arguments
    /// * `frequency` - Detected frequency in Hz
    ///
    /// # Returns
    /// * `Ok((Note, Offset))` - Nearest note and the offset from its ideal
    ///   frequency, with cents in (-50, 50]
    /// * `Err(NoteError::InvalidFrequency)` - `frequency` is not finite and
    ///   positive
    pub fn map(&self, frequency: f32) -> Result<(Note, Offset), NoteError> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(NoteError::InvalidFrequency(frequency));
        }
        // f64 keeps the rounding boundary away from single-precision noise.
        let semitones = 12.0 * (frequency as f64 / self.reference_hz as f64).log2();
        let (index, cents) = split_semitones(semitones);
        Ok((Note::from_index(index), Offset::from_cents(cents as f32)))
    }

    /// Ideal frequency of `note` under this mapper's reference.
    pub fn frequency_of(&self, note: Note) -> f32 {
        note.frequency(self.reference_hz)
    }
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self {
            reference_hz: crate::config::DEFAULT_REFERENCE_FREQUENCY_HZ,
        }
    }
}

/// A pitch estimate resolved against the scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TunedPitch {
    pub estimate: PitchEstimate,
    pub note: Note,
    pub offset: Offset,
    /// RMS level of the analysed window in dBFS.
    pub level_db: f32,
}

impl TunedPitch {
    pub fn frequency(&self) -> f32 {
        self.estimate.frequency
    }

    pub fn accuracy(&self) -> TuningAccuracy {
        self.offset.accuracy()
    }
}
