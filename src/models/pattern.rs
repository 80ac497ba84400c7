//! Patterns: the note containers referenced by bars
//!
//! A pattern keeps its notes sorted by start time and pairwise
//! non-overlapping. Several bars of a channel may reference the same
//! pattern number; the editing engine takes care of duplicating a pattern
//! before changing it for only some of those bars.

use serde::{Deserialize, Serialize};

use super::note::Note;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub notes: Vec<Note>,
    pub instruments: Vec<usize>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            instruments: vec![0],
        }
    }
}

impl Pattern {
    pub fn new(notes: Vec<Note>, instruments: Vec<usize>) -> Self {
        let mut pattern = Self { notes, instruments };
        pattern.sort_notes();
        pattern
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn sort_notes(&mut self) {
        self.notes.sort_by_key(|note| note.start);
    }

    /// Notes sorted by start and pairwise non-overlapping
    pub fn is_well_formed(&self) -> bool {
        self.notes.windows(2).all(|pair| pair[0].end <= pair[1].start)
    }

    /// Insert a note at its sorted position
    pub fn insert_note(&mut self, note: Note) {
        let index = self.notes.partition_point(|existing| existing.start <= note.start);
        self.notes.insert(index, note);
    }

    /// Remove and return every note matching `take`, keeping the rest in place
    pub fn take_notes(&mut self, take: impl Fn(&Note) -> bool) -> Vec<Note> {
        let (taken, kept): (Vec<Note>, Vec<Note>) = self.notes.drain(..).partition(|note| take(note));
        self.notes = kept;
        taken
    }

    /// Erase all note material inside `[lo, hi)`
    ///
    /// Notes crossing a boundary keep the parts outside the range; a note
    /// covering the whole range is split into two.
    pub fn truncate(&mut self, lo: i32, hi: i32) {
        if hi <= lo {
            return;
        }
        let mut kept = Vec::with_capacity(self.notes.len() + 1);
        for note in self.notes.drain(..) {
            if !note.overlaps(lo, hi) {
                kept.push(note);
                continue;
            }
            if let Some(before) = note.clipped(note.start, lo) {
                kept.push(before);
            }
            if let Some(after) = note.clipped(hi, note.end) {
                kept.push(after);
            }
        }
        self.notes = kept;
        self.sort_notes();
    }

    /// Same notes and the same set of instruments
    pub fn same_content(&self, notes: &[Note], instruments: &[usize]) -> bool {
        self.notes.as_slice() == notes && same_instruments(&self.instruments, instruments)
    }
}

/// Instrument lists compared as sets
pub fn same_instruments(a: &[usize], b: &[usize]) -> bool {
    a.len() == b.len() && a.iter().all(|instrument| b.contains(instrument))
}
