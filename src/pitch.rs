//! Equal-temperament tuning helpers.

use std::fmt;

/// Error from parsing a note name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteError {
    /// The letter/accidental prefix is not a recognized note.
    UnknownNote(String),
    /// The octave suffix is missing or not a valid integer.
    InvalidOctave(String),
}

impl fmt::Display for NoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteError::UnknownNote(name) => write!(f, "unknown note name: {:?}", name),
            NoteError::InvalidOctave(name) => write!(f, "invalid octave in note name: {:?}", name),
        }
    }
}

impl std::error::Error for NoteError {}

/// Semitone offset of a note letter/accidental relative to C.
fn base_offset(prefix: &str) -> Option<i32> {
    Some(match prefix {
        "Cb" => -1,
        "C" => 0,
        "C#" => 1,
        "Db" => 1,
        "D" => 2,
        "D#" => 3,
        "Eb" => 3,
        "E" => 4,
        "E#" => 5,
        "Fb" => 4,
        "F" => 5,
        "F#" => 6,
        "Gb" => 6,
        "G" => 7,
        "G#" => 8,
        "Ab" => 8,
        "A" => 9,
        "A#" => 10,
        "Bb" => 10,
        "B" => 11,
        "B#" => 12,
        _ => return None,
    })
}

/// Frequency of a named note such as "C4", "Bb3" or "F#5", in Hz.
///
/// Twelve-tone equal temperament around A4 = 440 Hz; the octave number is
/// read from the trailing digits of the name.
pub fn note_frequency(name: &str) -> Result<f64, NoteError> {
    let digits = name
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(name.len());
    let offset = base_offset(&name[..digits])
        .ok_or_else(|| NoteError::UnknownNote(name.to_string()))?;
    let octave: i32 = name[digits..]
        .parse()
        .map_err(|_| NoteError::InvalidOctave(name.to_string()))?;
    Ok(440.0 * ((offset - 9) as f64 / 12.0 + (octave - 4) as f64).exp2())
}

/// Frequency of a MIDI note number, in Hz (69 = A4 = 440 Hz).
pub fn midi_note_frequency(note: u8) -> f64 {
    440.0 * ((note as f64 - 69.0) / 12.0).exp2()
}
