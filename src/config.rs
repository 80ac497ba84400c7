//! Engine constants and caller-controlled options
//!
//! `Config` carries the fixed musical resolution of the sequencer (parts per
//! beat, pitch ranges, note volume ceiling). `EditorOptions` is deserialized
//! from the UI and carries the switches that change how edits behave.

use serde::{Deserialize, Serialize};

/// Fixed engine constants
pub struct Config;

impl Config {
    /// Time resolution: ticks ("parts") per beat
    pub const PARTS_PER_BEAT: i32 = 24;
    pub const PITCHES_PER_OCTAVE: i32 = 12;
    /// Highest pitch of a pitch channel (7 octaves)
    pub const MAX_PITCH: i32 = 84;
    /// Number of distinct pitches a noise channel supports
    pub const DRUM_COUNT: i32 = 12;
    /// Volume ceiling of a note pin
    pub const NOTE_SIZE_MAX: i32 = 6;
    pub const MAX_CHORD_SIZE: usize = 4;
    pub const LAYERED_INSTRUMENT_COUNT_MAX: usize = 4;
    /// Number of modulator slots on a mod channel instrument
    pub const MOD_COUNT: usize = 6;
    /// Pitch used for synthesized notes when no neighbouring note gives one
    pub const REFERENCE_PITCH: i32 = 36;
    /// Key of the clipboard slot in the key/value store
    pub const CLIPBOARD_KEY: &'static str = "selectionCopy";
    pub const DEFAULT_HISTORY_SIZE: usize = 100;
}

/// Options supplied by the caller
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorOptions {
    /// When false, transposition and flattening snap pitches to the song scale
    pub notes_outside_scale: bool,

    /// Maximum number of undo steps kept by the history
    pub max_history: usize,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            notes_outside_scale: false,
            max_history: Config::DEFAULT_HISTORY_SIZE,
        }
    }
}
