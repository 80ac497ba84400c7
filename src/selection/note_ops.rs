//! Note-level rewrites of the selected patterns
//!
//! Each algorithm is a pure function from a pattern and a part range to the
//! rewritten pattern (`None` when nothing changes). The engine methods at the
//! bottom apply them to every distinct selected pattern.
//!
//! Which notes an algorithm touches depends on what it does:
//! - per-note rewrites use notes overlapping the range
//! - re-positioning (remove space, spread) uses notes starting in the range
//! - horizontal mirroring uses notes fully inside the range

use num_rational::Ratio;
use std::ops::Range;

use super::SelectionEngine;
use crate::config::Config;
use crate::errors::Result;
use crate::models::note::round_ratio;
use crate::models::scale::nearest_in_scale;
use crate::models::{ChannelKind, Note, NotePin, Pattern, Song};
use crate::undo::{CommandRecorder, EditKind};

const PITCHED: &[ChannelKind] = &[ChannelKind::Pitch];
const NOTE_CHANNELS: &[ChannelKind] = &[ChannelKind::Pitch, ChannelKind::Noise];
const ALL_CHANNELS: &[ChannelKind] = &[ChannelKind::Pitch, ChannelKind::Noise, ChannelKind::Mod];

/// Indices of the notes overlapping `[lo, hi)`; contiguous in a sorted pattern
fn overlapping_block(pattern: &Pattern, lo: i32, hi: i32) -> Range<usize> {
    let first = pattern.notes.partition_point(|note| note.end <= lo);
    let last = pattern.notes.partition_point(|note| note.start < hi);
    first..last.max(first)
}

/// End of a note that started before `lo` and is still sounding at `lo`
fn straddle_end(pattern: &Pattern, lo: i32) -> i32 {
    pattern
        .notes
        .iter()
        .filter(|note| note.start < lo && note.end > lo)
        .map(|note| note.end)
        .max()
        .unwrap_or(lo)
}

fn move_note(note: &Note, start: i32) -> Note {
    let mut moved = note.shifted(start - note.start);
    moved.continues_last_pattern &= start == 0;
    moved
}

/// Split the pattern into (untouched notes, notes selected by `pick`)
fn partition_notes(pattern: &Pattern, pick: impl Fn(&Note) -> bool) -> (Pattern, Vec<Note>) {
    let mut rest = pattern.clone();
    let picked = rest.take_notes(pick);
    (rest, picked)
}

fn with_notes(rest: Pattern, notes: impl IntoIterator<Item = Note>) -> Pattern {
    let mut pattern = rest;
    pattern.notes.extend(notes);
    pattern.sort_notes();
    pattern
}

/// Collapse the notes overlapping the range into one note
pub fn merge_range(pattern: &Pattern, lo: i32, hi: i32) -> Option<Pattern> {
    let block = overlapping_block(pattern, lo, hi);
    if block.len() < 2 {
        return None;
    }
    let group = &pattern.notes[block.clone()];
    let first = &group[0];
    let start = first.start;
    let end = group.iter().map(|note| note.end).max().unwrap_or(first.end);
    let base = first.base_pitch();

    let mut pins = Vec::new();
    for note in group {
        let offset = note.base_pitch() - base;
        for pin in &note.pins {
            pins.push(NotePin::new(pin.interval + offset, pin.time + note.start - start, pin.size));
        }
    }
    let mut merged = Note::with_pins(first.pitches.clone(), start, end, pins);
    merged.continues_last_pattern = first.continues_last_pattern;
    merged.normalize_pins();

    let mut result = pattern.clone();
    result.notes.splice(block, std::iter::once(merged));
    Some(result)
}

/// Fill every silent gap of the range with a connecting note
pub fn bridge_range(
    pattern: &Pattern,
    lo: i32,
    hi: i32,
    do_bends: bool,
    default_pitch: i32,
) -> Option<Pattern> {
    let mut gaps = Vec::new();
    let mut cursor = lo;
    for note in &pattern.notes[overlapping_block(pattern, lo, hi)] {
        if note.start > cursor {
            gaps.push((cursor, note.start));
        }
        cursor = cursor.max(note.end);
    }
    if cursor < hi {
        gaps.push((cursor, hi));
    }
    if gaps.is_empty() {
        return None;
    }

    let mut result = pattern.clone();
    for (gap_start, gap_end) in gaps {
        let prev = pattern.notes.iter().rev().find(|note| note.end <= gap_start);
        let next = pattern.notes.iter().find(|note| note.start >= gap_end);
        let from = prev
            .map(Note::end_pitch)
            .or_else(|| next.map(Note::start_pitch))
            .unwrap_or(default_pitch);
        let to = next
            .map(Note::start_pitch)
            .or_else(|| prev.map(Note::end_pitch))
            .unwrap_or(default_pitch);
        let size = Config::NOTE_SIZE_MAX;
        let note = if do_bends {
            Note::with_pins(
                vec![from],
                gap_start,
                gap_end,
                vec![NotePin::new(0, 0, size), NotePin::new(to - from, gap_end - gap_start, size)],
            )
        } else {
            Note::new(from, gap_start, gap_end, size)
        };
        result.insert_note(note);
    }
    Some(result)
}

/// Evenly spaced cut points strictly inside `(x1, x2)`
pub fn cut_points(cuts: usize, x1: i32, x2: i32) -> Vec<i32> {
    let span = (x2 - x1) as i64;
    let mut points: Vec<i32> = (1..=cuts as i64)
        .map(|i| x1 + round_ratio(Ratio::new(span * i, cuts as i64 + 1)))
        .filter(|&point| point > x1 && point < x2)
        .collect();
    points.dedup();
    points
}

/// Cut every note spanning one of the cut points
pub fn separate_range(pattern: &Pattern, cuts: usize, x1: i32, x2: i32) -> Option<Pattern> {
    if cuts == 0 || x2 <= x1 {
        return None;
    }
    let points = cut_points(cuts, x1, x2);
    let mut notes = Vec::with_capacity(pattern.notes.len() + points.len());
    let mut changed = false;
    for note in &pattern.notes {
        let mut rest = note.clone();
        for &point in &points {
            if let Some((left, right)) = rest.split_at(point) {
                notes.push(left);
                rest = right;
                changed = true;
            }
        }
        notes.push(rest);
    }
    changed.then(|| Pattern {
        notes,
        instruments: pattern.instruments.clone(),
    })
}

/// Number of equal pieces a note is partitioned into
pub fn partition_count(note: &Note) -> i32 {
    let by_pins = note.pins.len().saturating_sub(1).max(2) as i32;
    by_pins.min(note.length())
}

/// Replace each note with contiguous pieces carrying its envelope
pub fn partition_range(pattern: &Pattern, lo: i32, hi: i32) -> Option<Pattern> {
    let (rest, picked) = partition_notes(pattern, |note| note.overlaps(lo, hi) && note.length() >= 2);
    if picked.is_empty() {
        return None;
    }
    let mut pieces = Vec::new();
    for note in &picked {
        let k = partition_count(note) as i64;
        let length = note.length() as i64;
        let bounds: Vec<i32> = (0..=k).map(|i| note.start + (length * i / k) as i32).collect();
        for pair in bounds.windows(2) {
            pieces.extend(note.clipped(pair[0], pair[1]));
        }
    }
    Some(with_notes(rest, pieces))
}

/// Scale snapping for flattened pitches
pub struct ScaleSnap<'a> {
    pub flags: &'a [bool; 12],
    pub min: i32,
    pub max: i32,
}

/// Hold a note at its duration-weighted average pitch
pub fn flatten_note(note: &Note, pitch_only: bool, snap: Option<&ScaleSnap>, range: (i32, i32)) -> Note {
    let base = note.base_pitch();
    let mut target = base + round_ratio(note.average_interval());
    if let Some(snap) = snap {
        target = nearest_in_scale(snap.flags, target, snap.min, snap.max);
    }
    let shift = target - base;

    let mut pitches: Vec<i32> = Vec::with_capacity(note.pitches.len());
    for pitch in note.pitches.iter().map(|pitch| pitch + shift) {
        if pitch >= range.0 && pitch <= range.1 && !pitches.contains(&pitch) {
            pitches.push(pitch);
        }
    }
    if pitches.is_empty() {
        pitches.push(target.clamp(range.0, range.1));
    }

    let length = note.length();
    let pins = if pitch_only {
        note.pins.iter().map(|pin| NotePin::new(0, pin.time, pin.size)).collect()
    } else {
        let size = round_ratio(note.average_size());
        vec![NotePin::new(0, 0, size), NotePin::new(0, length, size)]
    };
    let mut flat = Note {
        pitches,
        pins,
        ..note.clone()
    };
    flat.normalize_pins();
    flat
}

pub fn flatten_range(
    pattern: &Pattern,
    lo: i32,
    hi: i32,
    pitch_only: bool,
    snap: Option<&ScaleSnap>,
    range: (i32, i32),
) -> Option<Pattern> {
    let block = overlapping_block(pattern, lo, hi);
    if block.is_empty() {
        return None;
    }
    let mut result = pattern.clone();
    for note in &mut result.notes[block] {
        *note = flatten_note(note, pitch_only, snap, range);
    }
    Some(result)
}

/// Pack the notes starting in the range back to back
pub fn remove_space_range(pattern: &Pattern, lo: i32, hi: i32) -> Option<Pattern> {
    let mut cursor = straddle_end(pattern, lo);
    let (rest, movers) = partition_notes(pattern, |note| note.start >= lo && note.start < hi);
    if movers.is_empty() {
        return None;
    }
    let mut packed = Vec::with_capacity(movers.len());
    for note in &movers {
        packed.push(move_note(note, cursor));
        cursor += note.length();
    }
    Some(with_notes(rest, packed))
}

/// Redistribute the silence between the notes starting in the range
///
/// With `include_edges` the gaps before the first and after the last note
/// take part; otherwise the first and last note stay where they are.
pub fn spread_range(pattern: &Pattern, lo: i32, hi: i32, include_edges: bool) -> Option<Pattern> {
    let region_lo = straddle_end(pattern, lo);
    let (rest, movers) = partition_notes(pattern, |note| note.start >= lo && note.start < hi);
    let count = movers.len() as i64;
    let (first, last) = match (movers.first(), movers.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return None,
    };
    let (start, end, divisor, leading) = if include_edges {
        (region_lo, hi.max(last.end), count + 1, 1)
    } else {
        if count < 2 {
            return None;
        }
        (first.start, last.end, count - 1, 0)
    };
    let sounding: i64 = movers.iter().map(|note| note.length() as i64).sum();
    let silence = (end - start) as i64 - sounding;
    if silence < 0 {
        return None;
    }

    let mut spread = Vec::with_capacity(movers.len());
    let mut elapsed: i64 = 0;
    for (i, note) in movers.iter().enumerate() {
        let gaps = i as i64 + leading;
        let note_start = start as i64 + elapsed + silence * gaps / divisor;
        spread.push(move_note(note, note_start as i32));
        elapsed += note.length() as i64;
    }
    Some(with_notes(rest, spread))
}

/// Reverse the notes fully inside the range in time
///
/// Notes straddling either edge stay put and narrow the mirrored window.
pub fn mirror_horizontal_range(pattern: &Pattern, lo: i32, hi: i32) -> Option<Pattern> {
    let window_lo = straddle_end(pattern, lo);
    let window_hi = pattern
        .notes
        .iter()
        .filter(|note| note.start < hi && note.end > hi)
        .map(|note| note.start)
        .min()
        .unwrap_or(hi);
    let (rest, movers) = partition_notes(pattern, |note| note.contains_range(lo, hi));
    if movers.is_empty() {
        return None;
    }
    let mirrored = movers.iter().map(|note| {
        let length = note.length();
        let new_start = window_lo + window_hi - note.end;
        let pins = note
            .pins
            .iter()
            .rev()
            .map(|pin| NotePin::new(pin.interval, length - pin.time, pin.size))
            .collect();
        Note {
            pitches: note.pitches.clone(),
            pins,
            start: new_start,
            end: new_start + length,
            continues_last_pattern: note.continues_last_pattern && new_start == 0,
        }
    });
    Some(with_notes(rest, mirrored.collect::<Vec<_>>()))
}

/// Reflect pitches about the middle of `[min, max]`
pub fn mirror_vertical_range(pattern: &Pattern, lo: i32, hi: i32, min: i32, max: i32) -> Option<Pattern> {
    let block = overlapping_block(pattern, lo, hi);
    if block.is_empty() {
        return None;
    }
    let mut result = pattern.clone();
    for note in &mut result.notes[block] {
        for pitch in note.pitches.iter_mut() {
            *pitch = min + max - *pitch;
        }
        for pin in note.pins.iter_mut() {
            pin.interval = -pin.interval;
        }
    }
    Some(result)
}

/// Rescale the material of `[old_x1, old_x2)` into `[new_x1, new_x2)`
///
/// Notes straddling the old range keep their outside parts. Whatever
/// already occupies the destination is truncated away.
pub fn stretch_range(
    pattern: &Pattern,
    old_x1: i32,
    old_x2: i32,
    new_x1: i32,
    new_x2: i32,
) -> Option<Pattern> {
    if old_x2 <= old_x1 || new_x2 <= new_x1 || (old_x1, old_x2) == (new_x1, new_x2) {
        return None;
    }
    let mut rest = pattern.clone();
    let inside: Vec<Note> = pattern
        .notes
        .iter()
        .filter_map(|note| note.clipped(old_x1, old_x2))
        .collect();
    if inside.is_empty() {
        return None;
    }
    rest.truncate(old_x1, old_x2);
    rest.truncate(new_x1, new_x2);

    // Spans of two full i32 ranges multiply past i64
    let old_span = old_x2 as i128 - old_x1 as i128;
    let new_span = new_x2 as i128 - new_x1 as i128;
    let map = |time: i32| {
        let offset = Ratio::new((time as i128 - old_x1 as i128) * new_span, old_span)
            .round()
            .to_integer();
        (new_x1 as i128 + offset).clamp(i32::MIN as i128, i32::MAX as i128) as i32
    };

    for note in &inside {
        let start = map(note.start);
        let end = map(note.end);
        if end <= start {
            continue;
        }
        let pins = note
            .pins
            .iter()
            .map(|pin| NotePin::new(pin.interval, map(note.start + pin.time) - start, pin.size))
            .collect();
        let mut stretched = Note {
            pitches: note.pitches.clone(),
            pins,
            start,
            end,
            continues_last_pattern: note.continues_last_pattern && start == 0,
        };
        stretched.normalize_pins();
        rest.insert_note(stretched);
    }
    Some(rest)
}

impl SelectionEngine {
    /// Merge the notes of the active range into one note per pattern
    pub fn merge_notes<R: CommandRecorder + ?Sized>(&mut self, song: &mut Song, recorder: &mut R) -> Result<bool> {
        self.commit(EditKind::Merge, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            engine.rewrite_selected_patterns(group, PITCHED, |_, _, pattern| merge_range(pattern, lo, hi))
        })
    }

    /// Fill the gaps of the active range with connecting notes
    pub fn bridge_notes<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        do_bends: bool,
    ) -> Result<bool> {
        self.commit(EditKind::Bridge, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            engine.rewrite_selected_patterns(group, NOTE_CHANNELS, |song, channel, pattern| {
                let default_pitch = match song.channel_kind(channel) {
                    ChannelKind::Noise => Config::DRUM_COUNT / 2,
                    _ => Config::REFERENCE_PITCH,
                };
                bridge_range(pattern, lo, hi, do_bends, default_pitch)
            })
        })
    }

    /// Cut notes at `cuts` evenly spaced points of `[x1, x2)`
    ///
    /// Without explicit bounds the active range is used.
    pub fn separate_notes<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        cuts: usize,
        x1: Option<i32>,
        x2: Option<i32>,
    ) -> Result<bool> {
        self.commit(EditKind::Separate, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            let (x1, x2) = (x1.unwrap_or(lo), x2.unwrap_or(hi));
            engine.rewrite_selected_patterns(group, ALL_CHANNELS, |_, _, pattern| {
                separate_range(pattern, cuts, x1, x2)
            })
        })
    }

    pub fn partition_notes<R: CommandRecorder + ?Sized>(&mut self, song: &mut Song, recorder: &mut R) -> Result<bool> {
        self.commit(EditKind::Partition, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            engine.rewrite_selected_patterns(group, ALL_CHANNELS, |_, _, pattern| partition_range(pattern, lo, hi))
        })
    }

    /// Hold each note at its average pitch; `pitch_only` keeps the volume curve
    pub fn flatten_notes<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        pitch_only: bool,
    ) -> Result<bool> {
        let snap_to_scale = !self.options.notes_outside_scale;
        self.commit(EditKind::Flatten, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            engine.rewrite_selected_patterns(group, NOTE_CHANNELS, |song, channel, pattern| {
                let range = song.pitch_range(channel, Some(pattern));
                let snap = (snap_to_scale && song.channel_kind(channel) == ChannelKind::Pitch).then(|| ScaleSnap {
                    flags: &song.scale().flags,
                    min: range.0,
                    max: range.1,
                });
                flatten_range(pattern, lo, hi, pitch_only, snap.as_ref(), range)
            })
        })
    }

    pub fn remove_space<R: CommandRecorder + ?Sized>(&mut self, song: &mut Song, recorder: &mut R) -> Result<bool> {
        self.commit(EditKind::RemoveSpace, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            engine.rewrite_selected_patterns(group, ALL_CHANNELS, |_, _, pattern| remove_space_range(pattern, lo, hi))
        })
    }

    pub fn spread_evenly<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        include_edges: bool,
    ) -> Result<bool> {
        self.commit(EditKind::Spread, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            engine.rewrite_selected_patterns(group, ALL_CHANNELS, |_, _, pattern| {
                spread_range(pattern, lo, hi, include_edges)
            })
        })
    }

    /// Mirror in time, or in pitch when `vertical`
    pub fn mirror_notes<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        vertical: bool,
    ) -> Result<bool> {
        self.commit(EditKind::Mirror, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            if vertical {
                engine.rewrite_selected_patterns(group, NOTE_CHANNELS, |song, channel, pattern| {
                    let (min, max) = song.pitch_range(channel, Some(pattern));
                    mirror_vertical_range(pattern, lo, hi, min, max)
                })
            } else {
                engine.rewrite_selected_patterns(group, ALL_CHANNELS, |_, _, pattern| {
                    mirror_horizontal_range(pattern, lo, hi)
                })
            }
        })
    }

    /// Stretch `[old_x1, old_x2)` onto `[new_x1, new_x2)`
    ///
    /// Repeated stretches (a drag in progress) coalesce into one undo step.
    pub fn stretch_notes<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        old_x1: i32,
        old_x2: i32,
        new_x1: i32,
        new_x2: i32,
    ) -> Result<bool> {
        self.commit(EditKind::Stretch, true, song, recorder, |engine, group| {
            let parts_per_bar = group.song().parts_per_bar();
            let (new_x1, new_x2) = (new_x1.clamp(0, parts_per_bar), new_x2.clamp(0, parts_per_bar));
            engine.rewrite_selected_patterns(group, ALL_CHANNELS, |_, _, pattern| {
                stretch_range(pattern, old_x1, old_x2, new_x1, new_x2)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(notes: Vec<Note>) -> Pattern {
        Pattern::new(notes, vec![0])
    }

    fn spans(pattern: &Pattern) -> Vec<(i32, i32)> {
        pattern.notes.iter().map(|note| (note.start, note.end)).collect()
    }

    #[test]
    fn test_merge_spans_group_and_keeps_first_pitch() {
        let source = pattern(vec![Note::new(24, 0, 4, 6), Note::new(28, 8, 12, 3), Note::new(30, 40, 44, 6)]);
        let merged = merge_range(&source, 0, 16).unwrap();
        assert_eq!(spans(&merged), vec![(0, 12), (40, 44)]);
        let note = &merged.notes[0];
        assert_eq!(note.pitches, vec![24]);
        // The second note is rebased onto the first note's pitch
        assert_eq!(note.pin_at(10).interval, 4);
        assert_eq!(note.pin_at(10).size, 3);
        assert!(merge_range(&source, 0, 6).is_none());
    }

    #[test]
    fn test_merge_collapses_shared_boundary_pin() {
        let source = pattern(vec![Note::new(24, 0, 4, 6), Note::new(24, 4, 8, 2)]);
        let merged = merge_range(&source, 0, 8).unwrap();
        let times: Vec<i32> = merged.notes[0].pins.iter().map(|pin| pin.time).collect();
        assert_eq!(times, vec![0, 4, 8]);
        assert_eq!(merged.notes[0].pins[1].size, 2);
    }

    #[test]
    fn test_bridge_without_bends_holds_previous_pitch() {
        let source = pattern(vec![Note::new(60, 0, 4, 6), Note::new(67, 8, 12, 6)]);
        let bridged = bridge_range(&source, 0, 12, false, 36).unwrap();
        assert_eq!(spans(&bridged), vec![(0, 4), (4, 8), (8, 12)]);
        let gap = &bridged.notes[1];
        assert_eq!(gap.pitches, vec![60]);
        assert!(gap.pins.iter().all(|pin| pin.interval == 0));
    }

    #[test]
    fn test_bridge_with_bends_slides_between_neighbours() {
        let source = pattern(vec![Note::new(60, 0, 4, 6), Note::new(67, 8, 12, 6)]);
        let bridged = bridge_range(&source, 0, 16, true, 36).unwrap();
        assert_eq!(spans(&bridged), vec![(0, 4), (4, 8), (8, 12), (12, 16)]);
        assert_eq!(bridged.notes[1].end_pitch(), 67);
        assert_eq!(bridged.notes[1].start_pitch(), 60);
        // Trailing gap has no following note and holds the last pitch
        assert_eq!(bridged.notes[3].start_pitch(), 67);
        assert!(bridged.is_well_formed());
    }

    #[test]
    fn test_bridge_empty_range_uses_default_pitch() {
        let bridged = bridge_range(&pattern(vec![]), 0, 24, true, 36).unwrap();
        assert_eq!(bridged.notes[0].pitches, vec![36]);
        assert_eq!(bridged.notes[0].end_pitch(), 36);
    }

    #[test]
    fn test_separate_splits_at_midpoint_with_interpolated_pins() {
        let source = pattern(vec![Note::with_pins(
            vec![60],
            0,
            8,
            vec![NotePin::new(0, 0, 100), NotePin::new(0, 8, 0)],
        )]);
        let split = separate_range(&source, 1, 0, 8).unwrap();
        assert_eq!(spans(&split), vec![(0, 4), (4, 8)]);
        assert_eq!(split.notes[0].pins, vec![NotePin::new(0, 0, 100), NotePin::new(0, 4, 50)]);
        assert_eq!(split.notes[1].pins, vec![NotePin::new(0, 0, 50), NotePin::new(0, 4, 0)]);
    }

    #[test]
    fn test_separate_leaves_notes_without_cut_points() {
        let source = pattern(vec![Note::new(60, 0, 3, 6), Note::new(60, 20, 30, 6)]);
        assert!(separate_range(&source, 1, 0, 8).is_none());
        assert_eq!(cut_points(3, 0, 8), vec![2, 4, 6]);
    }

    #[test]
    fn test_partition_uses_pin_segments() {
        let note = Note::with_pins(
            vec![60],
            0,
            12,
            vec![NotePin::new(0, 0, 6), NotePin::new(2, 4, 6), NotePin::new(0, 8, 6), NotePin::new(0, 12, 0)],
        );
        let parts = partition_range(&pattern(vec![note.clone()]), 0, 24).unwrap();
        assert_eq!(spans(&parts), vec![(0, 4), (4, 8), (8, 12)]);
        assert_eq!(parts.notes[1].pins[0].interval, note.pin_at(4).interval);
        assert!(parts.is_well_formed());
    }

    #[test]
    fn test_flatten_holds_weighted_average() {
        let note = Note::with_pins(
            vec![24],
            0,
            8,
            vec![NotePin::new(0, 0, 6), NotePin::new(4, 4, 6), NotePin::new(4, 8, 0)],
        );
        let flat = flatten_note(&note, false, None, (0, 84));
        assert_eq!(flat.pitches, vec![27]);
        assert_eq!(flat.pins, vec![NotePin::new(0, 0, 5), NotePin::new(0, 8, 5)]);

        let shaped = flatten_note(&note, true, None, (0, 84));
        assert_eq!(shaped.pins.last().unwrap().size, 0);
        assert!(shaped.pins.iter().all(|pin| pin.interval == 0));
    }

    #[test]
    fn test_flatten_snaps_into_scale() {
        let note = Note::with_pins(vec![24], 0, 8, vec![NotePin::new(0, 0, 6), NotePin::new(6, 8, 6)]);
        let major = crate::models::scale::SCALES[1].flags;
        let snap = ScaleSnap { flags: &major, min: 0, max: 84 };
        // Average is 27, which is outside C major
        assert_eq!(flatten_note(&note, false, Some(&snap), (0, 84)).pitches, vec![26]);
    }

    #[test]
    fn test_remove_space_is_idempotent() {
        let source = pattern(vec![Note::new(60, 2, 4, 6), Note::new(62, 10, 16, 6), Note::new(64, 30, 31, 6)]);
        let once = remove_space_range(&source, 0, 24).unwrap();
        assert_eq!(spans(&once), vec![(0, 2), (2, 8), (30, 31)]);
        let twice = remove_space_range(&once, 0, 24).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_spread_with_and_without_edges() {
        let source = pattern(vec![Note::new(60, 0, 2, 6), Note::new(62, 2, 4, 6), Note::new(64, 4, 6, 6)]);
        let inner = spread_range(&source, 0, 24, false);
        assert!(inner.is_some_and(|p| p == source));

        let source = pattern(vec![Note::new(60, 0, 2, 6), Note::new(62, 2, 4, 6), Note::new(64, 10, 12, 6)]);
        let inner = spread_range(&source, 0, 24, false).unwrap();
        assert_eq!(spans(&inner), vec![(0, 2), (5, 7), (10, 12)]);

        let edges = spread_range(&source, 0, 24, true).unwrap();
        assert_eq!(spans(&edges), vec![(4, 6), (11, 13), (17, 19)]);
    }

    #[test]
    fn test_mirror_horizontal_reverses_time() {
        let note = Note::with_pins(vec![60], 0, 4, vec![NotePin::new(0, 0, 6), NotePin::new(0, 4, 0)]);
        let source = pattern(vec![note, Note::new(62, 8, 10, 6)]);
        let mirrored = mirror_horizontal_range(&source, 0, 12).unwrap();
        assert_eq!(spans(&mirrored), vec![(2, 4), (8, 12)]);
        assert_eq!(mirrored.notes[1].pins, vec![NotePin::new(0, 0, 0), NotePin::new(0, 4, 6)]);
        assert_eq!(mirrored.notes[0].pitches, vec![62]);
    }

    #[test]
    fn test_mirror_horizontal_stays_clear_of_straddlers() {
        let source = pattern(vec![Note::new(60, 0, 10, 6), Note::new(62, 60, 80, 6)]);
        let mirrored = mirror_horizontal_range(&source, 0, 72).unwrap();
        assert_eq!(spans(&mirrored), vec![(50, 60), (60, 80)]);
    }

    #[test]
    fn test_mirror_vertical_reflects_pitch_and_bends() {
        let note = Note::with_pins(vec![10], 0, 4, vec![NotePin::new(0, 0, 6), NotePin::new(2, 4, 6)]);
        let mirrored = mirror_vertical_range(&pattern(vec![note]), 0, 24, 0, 84).unwrap();
        assert_eq!(mirrored.notes[0].pitches, vec![74]);
        assert_eq!(mirrored.notes[0].end_pitch(), 72);
    }

    #[test]
    fn test_stretch_grows_and_truncates_neighbours() {
        let source = pattern(vec![Note::new(60, 0, 4, 6), Note::new(62, 4, 8, 6), Note::new(64, 12, 16, 6)]);
        let stretched = stretch_range(&source, 0, 8, 0, 14).unwrap();
        assert_eq!(spans(&stretched), vec![(0, 7), (7, 14), (14, 16)]);
        assert!(stretched.is_well_formed());
    }

    #[test]
    fn test_stretch_shrinks_leaving_gap() {
        let source = pattern(vec![Note::new(60, 0, 4, 6), Note::new(62, 4, 8, 6), Note::new(64, 12, 16, 6)]);
        let stretched = stretch_range(&source, 0, 8, 0, 4).unwrap();
        assert_eq!(spans(&stretched), vec![(0, 2), (2, 4), (12, 16)]);
    }

    #[test]
    fn test_stretch_keeps_straddling_outside_part() {
        let source = pattern(vec![Note::new(60, 0, 8, 6)]);
        let stretched = stretch_range(&source, 4, 8, 4, 6).unwrap();
        assert_eq!(spans(&stretched), vec![(0, 4), (4, 6)]);
    }

    #[test]
    fn test_stretch_handles_extreme_ranges() {
        let source = pattern(vec![Note::new(60, 0, 8, 6)]);
        let stretched = stretch_range(&source, -2_000_000_000, 2_000_000_000, 0, 192).unwrap();
        assert!(stretched.notes.is_empty());
        assert!(stretched.is_well_formed());
    }
}
