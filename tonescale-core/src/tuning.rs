//! # Pitch Unit Module
//!
//! Conversions between the pitch units used throughout the pipeline:
//! frequency in Hz, absolute cents relative to a reference frequency,
//! pitch class (cents modulo one octave) and fractional MIDI key.
//!
//! All conversions are pure. Hz and absolute cents are exact inverses for a
//! fixed reference, as are Hz and MIDI keys.

use once_cell::sync::Lazy;

/// Cents in one octave.
pub const CENTS_PER_OCTAVE: f64 = 1200.0;

/// C4 (≈ 261.626 Hz), the default reference for absolute cents.
pub const DEFAULT_REFERENCE_FREQUENCY: f64 = 261.625_565_300_598_6;

/// Frequency of A4, MIDI key 69.
pub const A4_FREQUENCY: f64 = 440.0;

/// A single equal-tempered MIDI note.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// MIDI key number (0-127)
    pub key: u8,
    /// Frequency in Hz
    pub frequency: f64,
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// All 128 MIDI notes, computed once with A4 = 440 Hz.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    (0..128u8)
        .map(|key| {
            // MIDI octaves start at C-1 for key 0.
            let octave = key as i32 / 12 - 1;
            Note {
                name: format!("{}{}", NOTE_NAMES[key as usize % 12], octave),
                key,
                frequency: midi_key_to_hz(key as f64),
            }
        })
        .collect()
});

/// Converts a frequency to cents above `reference` Hz.
///
/// Both frequencies must be positive.
pub fn hz_to_absolute_cents(hz: f64, reference: f64) -> f64 {
    CENTS_PER_OCTAVE * (hz / reference).log2()
}

/// Inverse of [`hz_to_absolute_cents`].
pub fn absolute_cents_to_hz(cents: f64, reference: f64) -> f64 {
    reference * 2.0_f64.powf(cents / CENTS_PER_OCTAVE)
}

/// Wraps any cents value into the octave `[0, 1200)`.
pub fn pitch_class(cents: f64) -> f64 {
    let wrapped = cents.rem_euclid(CENTS_PER_OCTAVE);
    // rem_euclid of a tiny negative value rounds up to the period itself.
    if wrapped >= CENTS_PER_OCTAVE { 0.0 } else { wrapped }
}

/// Converts a frequency to a fractional MIDI key (A4 = 69).
pub fn hz_to_midi_key(hz: f64) -> f64 {
    69.0 + 12.0 * (hz / A4_FREQUENCY).log2()
}

/// Inverse of [`hz_to_midi_key`].
pub fn midi_key_to_hz(key: f64) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((key - 69.0) / 12.0)
}

/// Calculates the deviation of `freq` from `target_freq` in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_between(freq: f64, target_freq: f64) -> f64 {
    CENTS_PER_OCTAVE * (freq / target_freq).log2()
}

/// Finds the MIDI note closest to a frequency.
///
/// Returns `None` for frequencies outside the MIDI range or non-positive input.
pub fn nearest_note(hz: f64) -> Option<&'static Note> {
    if !(hz.is_finite() && hz > 0.0) {
        return None;
    }
    let key = hz_to_midi_key(hz).round();
    if !(0.0..=127.0).contains(&key) {
        return None;
    }
    NOTES.get(key as usize)
}

/// Name of the equal-tempered pitch class nearest to a pitch class in cents,
/// measured from C, together with the deviation from it in cents.
pub fn nearest_pitch_class_name(cents: f64) -> (&'static str, f64) {
    let class = pitch_class(cents);
    let step = (class / 100.0).round();
    let deviation = class - step * 100.0;
    (NOTE_NAMES[step as usize % 12], deviation)
}
