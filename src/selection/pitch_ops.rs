//! Pitch and timing conformance: transpose, force-rhythm, force-scale

use num_rational::Ratio;

use super::SelectionEngine;
use crate::errors::Result;
use crate::models::note::round_ratio;
use crate::models::scale::{generate_scale_map, remap_pitch, step_pitch, union_of_used_degrees};
use crate::models::{ChannelKind, Note, NotePin, Pattern, Song};
use crate::undo::{CommandRecorder, EditKind};

const PITCHED: &[ChannelKind] = &[ChannelKind::Pitch];
const ALL_CHANNELS: &[ChannelKind] = &[ChannelKind::Pitch, ChannelKind::Noise, ChannelKind::Mod];

/// Rebuild a note from new absolute pitches for its voices and pins
///
/// `map` turns an absolute pitch into its replacement; `None` leaves the
/// whole note unchanged.
fn repitch(note: &Note, mut map: impl FnMut(i32) -> Option<i32>) -> Option<Note> {
    let base = note.base_pitch();
    let mut pitches: Vec<i32> = Vec::with_capacity(note.pitches.len());
    for &pitch in &note.pitches {
        let moved = map(pitch)?;
        if !pitches.contains(&moved) {
            pitches.push(moved);
        }
    }
    let new_base = pitches.first().copied()?;
    let mut pins = Vec::with_capacity(note.pins.len());
    for pin in &note.pins {
        let moved = map(base + pin.interval)?;
        pins.push(NotePin::new(moved - new_base, pin.time, pin.size));
    }
    Some(Note {
        pitches,
        pins,
        ..note.clone()
    })
}

/// Move one step or octave; `scale` makes single steps skip out-of-scale pitches
pub fn transpose_note(note: &Note, upward: bool, octave: bool, scale: Option<&[bool; 12]>, range: (i32, i32)) -> Note {
    repitch(note, |pitch| step_pitch(pitch, upward, octave, scale, range.0, range.1)).unwrap_or_else(|| note.clone())
}

pub fn transpose_range(
    pattern: &Pattern,
    lo: i32,
    hi: i32,
    upward: bool,
    octave: bool,
    scale: Option<&[bool; 12]>,
    range: (i32, i32),
) -> Option<Pattern> {
    let mut result = pattern.clone();
    let mut touched = false;
    for note in result.notes.iter_mut().filter(|note| note.overlaps(lo, hi)) {
        *note = transpose_note(note, upward, octave, scale, range);
        touched = true;
    }
    touched.then_some(result)
}

/// Snap a time to the nearest multiple of `grid`, halves away from zero
pub fn quantize(time: i32, grid: i32) -> i32 {
    round_ratio(Ratio::new(time as i64, grid as i64)) * grid
}

/// Snap the notes overlapping the range to the rhythm grid
///
/// Quantized notes stay between their unselected neighbours. A note that
/// collapses keeps one grid step; overlaps are resolved by clipping the
/// earlier note, or dropping the later one when nothing would remain.
pub fn force_rhythm_range(pattern: &Pattern, lo: i32, hi: i32, grid: i32, parts_per_bar: i32) -> Option<Pattern> {
    let first = pattern.notes.partition_point(|note| note.end <= lo);
    let last = pattern.notes.partition_point(|note| note.start < hi).max(first);
    if first == last {
        return None;
    }
    let floor = first.checked_sub(1).map_or(0, |i| pattern.notes[i].end);
    let ceiling = pattern.notes.get(last).map_or(parts_per_bar, |note| note.start);

    let mut quantized: Vec<Note> = Vec::with_capacity(last - first);
    for note in &pattern.notes[first..last] {
        let start = quantize(note.start, grid).clamp(floor, ceiling);
        let mut end = quantize(note.end, grid).clamp(floor, ceiling);
        if end <= start {
            end = (start + grid).min(ceiling);
        }
        if end <= start {
            continue;
        }
        let pins = note
            .pins
            .iter()
            .map(|pin| NotePin::new(pin.interval, quantize(note.start + pin.time, grid) - start, pin.size))
            .collect();
        let mut snapped = Note {
            pitches: note.pitches.clone(),
            pins,
            start,
            end,
            continues_last_pattern: note.continues_last_pattern && start == 0,
        };
        snapped.normalize_pins();

        if let Some(previous) = quantized.last_mut() {
            if snapped.start < previous.end {
                if snapped.start > previous.start {
                    if let Some(clipped) = previous.clipped(previous.start, snapped.start) {
                        *previous = clipped;
                    }
                } else {
                    continue;
                }
            }
        }
        quantized.push(snapped);
    }

    let mut result = pattern.clone();
    result.notes.splice(first..last, quantized);
    Some(result)
}

/// Remap every pitch of the notes overlapping the range through `map`
pub fn force_scale_range(pattern: &Pattern, lo: i32, hi: i32, map: &[i32; 12], range: (i32, i32)) -> Option<Pattern> {
    let mut result = pattern.clone();
    let mut touched = false;
    for note in result.notes.iter_mut().filter(|note| note.overlaps(lo, hi)) {
        if let Some(remapped) = repitch(note, |pitch| Some(remap_pitch(map, pitch).clamp(range.0, range.1))) {
            *note = remapped;
            touched = true;
        }
    }
    touched.then_some(result)
}

impl SelectionEngine {
    /// Transpose the selected pitch channels by a step or an octave
    ///
    /// Repeated presses coalesce into one undo step.
    pub fn transpose<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        upward: bool,
        octave: bool,
    ) -> Result<bool> {
        let snap_to_scale = !self.options.notes_outside_scale;
        self.commit(EditKind::Transpose, true, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            engine.rewrite_selected_patterns(group, PITCHED, |song, channel, pattern| {
                let scale = snap_to_scale.then_some(&song.scale().flags);
                let range = song.pitch_range(channel, Some(pattern));
                transpose_range(pattern, lo, hi, upward, octave, scale, range)
            })
        })
    }

    pub fn force_rhythm<R: CommandRecorder + ?Sized>(&mut self, song: &mut Song, recorder: &mut R) -> Result<bool> {
        self.commit(EditKind::ForceRhythm, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            let grid = group.song().rhythm().step_parts();
            let parts_per_bar = group.song().parts_per_bar();
            engine.rewrite_selected_patterns(group, ALL_CHANNELS, |_, _, pattern| {
                force_rhythm_range(pattern, lo, hi, grid, parts_per_bar)
            })
        })
    }

    /// Conform the selected pitch notes to the song scale
    pub fn force_scale<R: CommandRecorder + ?Sized>(&mut self, song: &mut Song, recorder: &mut R) -> Result<bool> {
        self.commit(EditKind::ForceScale, false, song, recorder, |engine, group| {
            let (lo, hi) = engine.time_range(group.song());
            let song = group.song();
            let mut used = [false; 12];
            used[0] = true;
            for channel in engine.each_selected_channel() {
                if song.channel_kind(channel) != ChannelKind::Pitch {
                    continue;
                }
                for number in engine.each_selected_pattern(song, channel)? {
                    let notes = song.pattern(channel, number)?.notes.iter();
                    union_of_used_degrees(notes.filter(|note| note.overlaps(lo, hi)), &mut used);
                }
            }
            let map = generate_scale_map(&used, &song.scale().flags);
            log::debug!("scale map {:?}", map);
            engine.rewrite_selected_patterns(group, PITCHED, |song, channel, pattern| {
                let range = song.pitch_range(channel, Some(pattern));
                force_scale_range(pattern, lo, hi, &map, range)
            })
        })
    }
}
