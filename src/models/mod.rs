//! Models module for the pattern editor
//!
//! Value types for notes and pins, the pattern container, scale tables and
//! the song document with its per-channel pattern arena.

pub mod note;
pub mod pattern;
pub mod scale;
pub mod song;

// Re-export commonly used types
pub use note::{Note, NotePin};
pub use pattern::Pattern;
pub use scale::{Rhythm, Scale};
pub use song::{Channel, ChannelKind, Instrument, Song};
