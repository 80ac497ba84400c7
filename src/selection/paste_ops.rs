//! Copy, paste and paste-numbers
//!
//! Paste picks one of three policies:
//! - a single copied bar onto a single bar reuses the copied pattern number
//!   when that pattern is identical or free
//! - a paste with a part range active writes only inside the range, sharing
//!   one result per (copied, current) pattern pair
//! - a whole-bar box paste clears the destination bars first, then shares
//!   one result per copied pattern
//!
//! A selection larger than the copied material is filled by repeating the
//! copied channels and bars.

use std::collections::{BTreeMap, HashMap};

use super::SelectionEngine;
use crate::clipboard::{ChannelCopy, Clipboard, ClipboardPayload, PatternCopy};
use crate::config::Config;
use crate::errors::{EditorError, Result};
use crate::models::{ChannelKind, Note, Pattern, Song};
use crate::undo::{ChangeGroup, CommandRecorder, EditKind};

/// Renumber a chord for a noise channel
///
/// Pitches become a contiguous ascending run starting at the lowest pitch
/// modulo the drum count, shifted down so the run fits.
pub fn remap_pitches_for_noise(pitches: &[i32]) -> Vec<i32> {
    let mut sorted = pitches.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let Some(&lowest) = sorted.first() else {
        return Vec::new();
    };
    let count = (sorted.len() as i32).min(Config::DRUM_COUNT);
    let start = lowest.rem_euclid(Config::DRUM_COUNT).min(Config::DRUM_COUNT - count);
    (start..start + count).collect()
}

fn note_for_noise(note: &Note) -> Note {
    let pitches = remap_pitches_for_noise(&note.pitches);
    let lowest = pitches.first().copied().unwrap_or(0);
    let highest = pitches.last().copied().unwrap_or(0);
    let mut remapped = Note {
        pitches,
        ..note.clone()
    };
    for pin in remapped.pins.iter_mut() {
        pin.interval = pin.interval.clamp(-lowest, Config::DRUM_COUNT - 1 - highest);
    }
    remapped
}

/// Write copied notes into `[lo, hi)`, repeating them every `part_duration`
///
/// Existing material in the range is truncated away first.
pub fn paste_notes(pattern: &Pattern, copy: &[Note], lo: i32, hi: i32, part_duration: i32, for_noise: bool) -> Pattern {
    let mut result = pattern.clone();
    result.truncate(lo, hi);
    if part_duration <= 0 {
        return result;
    }
    let mut offset = lo;
    while offset < hi {
        let tile_end = (offset + part_duration).min(hi);
        for note in copy {
            let mut moved = note.shifted(offset);
            moved.continues_last_pattern &= moved.start == 0;
            let Some(mut placed) = moved.clipped(offset, tile_end) else {
                continue;
            };
            if for_noise {
                placed = note_for_noise(&placed);
            }
            if result.notes.iter().any(|other| other.overlaps(placed.start, placed.end)) {
                log::warn!("skipping overlapping pasted note at {}", placed.start);
                continue;
            }
            result.insert_note(placed);
        }
        offset += part_duration;
    }
    result
}

/// Copied instruments that exist on the destination channel
fn usable_instruments(song: &Song, channel: usize, instruments: &[usize]) -> Vec<usize> {
    let available = song.channels.get(channel).map_or(0, |ch| ch.instruments.len());
    let usable: Vec<usize> = instruments.iter().copied().filter(|&i| i < available).collect();
    if usable.is_empty() {
        Pattern::default().instruments
    } else {
        usable
    }
}

fn compatible(song: &Song, channel: usize, copy: &ChannelCopy) -> bool {
    (song.channel_kind(channel) == ChannelKind::Mod) == copy.is_mod_channel
}

fn needs_noise_remap(song: &Song, channel: usize, copy: &ChannelCopy) -> bool {
    song.channel_kind(channel) == ChannelKind::Noise && !copy.is_noise && !copy.is_mod_channel
}

struct PastePlan<'p> {
    /// (destination channel, copied channel)
    channels: Vec<(usize, &'p ChannelCopy)>,
    bars: Vec<usize>,
}

impl<'p> PastePlan<'p> {
    /// Destination of each copied channel and bar
    ///
    /// A box selection is filled completely; a single cell receives the
    /// copied block as far as the song extends.
    fn new(engine: &SelectionEngine, song: &Song, payload: &'p ClipboardPayload) -> Self {
        let selection = &engine.selection;
        let copied_width = payload.channels.iter().map(|c| c.bars.len()).max().unwrap_or(0);
        let copied_height = payload.channels.len();
        if copied_width == 0 || copied_height == 0 {
            return Self {
                channels: Vec::new(),
                bars: Vec::new(),
            };
        }

        let (first_channel, first_bar) = (selection.channel_range.0, selection.bar_range.0);
        let (height, width) = if selection.is_box() {
            (selection.channel_height(), selection.bar_width())
        } else {
            (
                copied_height.min(song.channel_count() - first_channel),
                copied_width.min(song.bar_count - first_bar),
            )
        };
        Self {
            channels: (0..height)
                .map(|i| (first_channel + i, &payload.channels[i % copied_height]))
                .collect(),
            bars: (first_bar..first_bar + width).collect(),
        }
    }

    /// Copied pattern number for the `index`th destination bar
    fn copied_number(copy: &ChannelCopy, index: usize) -> usize {
        match copy.bars.len() {
            0 => 0,
            len => copy.bars[index % len],
        }
    }
}

impl SelectionEngine {
    /// Capture the selection as a clipboard payload
    pub fn copy_selection(&self, song: &Song) -> Result<ClipboardPayload> {
        self.selection.validate(song)?;
        let (lo, hi) = self.time_range(song);
        if hi <= lo {
            return Err(EditorError::InvalidSelection(format!("nothing to copy in {}..{}", lo, hi)));
        }
        let mut channels = Vec::new();
        for channel in self.each_selected_channel() {
            let kind = song.channel_kind(channel);
            let mut patterns = BTreeMap::new();
            let mut bars = Vec::new();
            for bar in self.each_selected_bar() {
                let number = song.pattern_number(channel, bar)?;
                bars.push(number);
                if patterns.contains_key(&number) {
                    continue;
                }
                let copy = match song.get_pattern(channel, bar)? {
                    Some(pattern) => PatternCopy {
                        instruments: pattern.instruments.clone(),
                        notes: pattern
                            .notes
                            .iter()
                            .filter_map(|note| note.clipped(lo, hi))
                            .map(|note| note.shifted(-lo))
                            .collect(),
                    },
                    None => PatternCopy {
                        instruments: Pattern::default().instruments,
                        notes: Vec::new(),
                    },
                };
                patterns.insert(number, copy);
            }
            channels.push(ChannelCopy {
                is_noise: kind == ChannelKind::Noise,
                is_mod_channel: kind == ChannelKind::Mod,
                patterns,
                bars,
            });
        }
        Ok(ClipboardPayload {
            part_duration: hi - lo,
            channels,
        })
    }

    /// Copy the selection into the clipboard slot
    pub fn copy(&self, song: &Song, clipboard: &mut Clipboard) -> Result<bool> {
        let payload = self.copy_selection(song)?;
        log::info!(
            "copied {} channel(s) of {} part(s)",
            payload.channels.len(),
            payload.part_duration
        );
        Ok(clipboard.store(&payload))
    }

    /// Paste the clipboard slot; a missing or malformed payload is a no-op
    pub fn paste<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        clipboard: &Clipboard,
    ) -> Result<bool> {
        match clipboard.load() {
            Some(payload) => self.paste_payload(song, recorder, &payload),
            None => {
                log::debug!("nothing to paste");
                Ok(false)
            }
        }
    }

    pub fn paste_payload<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        payload: &ClipboardPayload,
    ) -> Result<bool> {
        self.commit(EditKind::Paste, false, song, recorder, |engine, group| {
            let plan = PastePlan::new(engine, group.song(), payload);
            let single = !engine.selection.is_box() && payload.channels.len() == 1 && payload.channels[0].bars.len() == 1;
            if single {
                engine.paste_single(group, &plan, payload)
            } else if engine.selection.pattern_selection_active() {
                engine.paste_in_range(group, &plan, payload)
            } else {
                engine.paste_whole_bars(group, &plan, payload)
            }
        })
    }

    fn paste_single(&self, group: &mut ChangeGroup, plan: &PastePlan, payload: &ClipboardPayload) -> Result<()> {
        let (Some(&(channel, copy)), Some(&bar)) = (plan.channels.first(), plan.bars.first()) else {
            return Ok(());
        };
        if !compatible(group.song(), channel, copy) {
            log::warn!("clipboard channel kind does not match channel {}", channel);
            return Ok(());
        }
        let copied = PastePlan::copied_number(copy, 0);
        let Some(source) = copy.patterns.get(&copied) else {
            return Ok(());
        };
        let (lo, hi) = self.time_range(group.song());
        let for_noise = needs_noise_remap(group.song(), channel, copy);
        let whole_bar = !self.selection.pattern_selection_active();

        if whole_bar && copied != 0 && !for_noise && self.try_reuse(group, channel, bar, copied, source, payload)? {
            return Ok(());
        }

        let mut number = group.ensure_exclusive(channel, bar)?;
        if number == 0 {
            if source.notes.is_empty() {
                return Ok(());
            }
            number = group.ensure_pattern_exists(channel, bar)?;
        }
        let song = group.song();
        let mut pasted = paste_notes(song.pattern(channel, number)?, &source.notes, lo, hi, payload.part_duration, for_noise);
        if whole_bar {
            pasted.instruments = usable_instruments(song, channel, &source.instruments);
        }
        group.replace_pattern(channel, number, pasted)
    }

    /// Point an empty bar at the copied pattern number when that slot
    /// already holds the copied content or is referenced by no bar
    fn try_reuse(
        &self,
        group: &mut ChangeGroup,
        channel: usize,
        bar: usize,
        copied: usize,
        source: &PatternCopy,
        payload: &ClipboardPayload,
    ) -> Result<bool> {
        let song = group.song();
        if song.pattern_number(channel, bar)? != 0
            || copied > song.patterns_per_channel
            || payload.part_duration != song.parts_per_bar()
        {
            return Ok(false);
        }
        let instruments = usable_instruments(song, channel, &source.instruments);
        let mut notes = source.notes.clone();
        notes.sort_by_key(|note| note.start);
        if song.pattern(channel, copied)?.same_content(&notes, &instruments) {
            log::debug!("bar {} reuses identical pattern {}", bar, copied);
            group.set_bar_pattern(channel, bar, copied)?;
            return Ok(true);
        }
        if song.pattern_is_unused(channel, copied) {
            let fresh = paste_notes(&Pattern::default(), &notes, 0, song.parts_per_bar(), payload.part_duration, false);
            group.replace_pattern(channel, copied, Pattern { instruments, ..fresh })?;
            group.set_bar_pattern(channel, bar, copied)?;
            log::debug!("bar {} reclaims unused pattern {}", bar, copied);
            return Ok(true);
        }
        Ok(false)
    }

    fn paste_in_range(&self, group: &mut ChangeGroup, plan: &PastePlan, payload: &ClipboardPayload) -> Result<()> {
        let (lo, hi) = self.time_range(group.song());
        if hi <= lo {
            log::debug!("empty paste range {}..{}", lo, hi);
            return Ok(());
        }
        for &(channel, copy) in &plan.channels {
            if !compatible(group.song(), channel, copy) {
                log::warn!("clipboard channel kind does not match channel {}", channel);
                continue;
            }
            let for_noise = needs_noise_remap(group.song(), channel, copy);
            let mut results: HashMap<(usize, usize), usize> = HashMap::new();
            for (index, &bar) in plan.bars.iter().enumerate() {
                let copied = PastePlan::copied_number(copy, index);
                let current = group.song().pattern_number(channel, bar)?;
                if let Some(&result) = results.get(&(copied, current)) {
                    group.set_bar_pattern(channel, bar, result)?;
                    continue;
                }
                let notes = copy.patterns.get(&copied).map_or(&[][..], |p| p.notes.as_slice());
                let mut number = group.ensure_exclusive(channel, bar)?;
                if number == 0 {
                    if notes.is_empty() {
                        results.insert((copied, current), 0);
                        continue;
                    }
                    number = group.ensure_pattern_exists(channel, bar)?;
                }
                let pasted = paste_notes(
                    group.song().pattern(channel, number)?,
                    notes,
                    lo,
                    hi,
                    payload.part_duration,
                    for_noise,
                );
                group.replace_pattern(channel, number, pasted)?;
                results.insert((copied, current), number);
            }
        }
        Ok(())
    }

    fn paste_whole_bars(&self, group: &mut ChangeGroup, plan: &PastePlan, payload: &ClipboardPayload) -> Result<()> {
        let parts_per_bar = group.song().parts_per_bar();
        for &(channel, copy) in &plan.channels {
            if !compatible(group.song(), channel, copy) {
                log::warn!("clipboard channel kind does not match channel {}", channel);
                continue;
            }
            for &bar in &plan.bars {
                group.erase_pattern_in_bar(channel, bar)?;
            }
            let for_noise = needs_noise_remap(group.song(), channel, copy);
            let mut results: HashMap<usize, usize> = HashMap::new();
            for (index, &bar) in plan.bars.iter().enumerate() {
                let copied = PastePlan::copied_number(copy, index);
                let Some(source) = copy.patterns.get(&copied).filter(|_| copied != 0) else {
                    continue;
                };
                if let Some(&result) = results.get(&copied) {
                    group.set_bar_pattern(channel, bar, result)?;
                    continue;
                }
                if !for_noise && self.try_reuse(group, channel, bar, copied, source, payload)? {
                    results.insert(copied, copied);
                    continue;
                }
                let number = group.ensure_pattern_exists(channel, bar)?;
                let song = group.song();
                let mut pasted = paste_notes(
                    song.pattern(channel, number)?,
                    &source.notes,
                    0,
                    parts_per_bar,
                    payload.part_duration,
                    for_noise,
                );
                pasted.instruments = usable_instruments(song, channel, &source.instruments);
                group.replace_pattern(channel, number, pasted)?;
                results.insert(copied, number);
            }
        }
        Ok(())
    }

    /// Paste only the bar → pattern number assignments
    pub fn paste_numbers<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        clipboard: &Clipboard,
    ) -> Result<bool> {
        let Some(payload) = clipboard.load() else {
            log::debug!("nothing to paste");
            return Ok(false);
        };
        self.paste_numbers_from(song, recorder, &payload)
    }

    pub fn paste_numbers_from<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        payload: &ClipboardPayload,
    ) -> Result<bool> {
        self.commit(EditKind::PasteNumbers, false, song, recorder, |engine, group| {
            let plan = PastePlan::new(engine, group.song(), payload);
            for &(channel, copy) in &plan.channels {
                let kind = group.song().channel_kind(channel);
                if copy.is_mod_channel != (kind == ChannelKind::Mod) || copy.is_noise != (kind == ChannelKind::Noise) {
                    log::warn!("clipboard channel kind does not match channel {}", channel);
                    continue;
                }
                let highest = copy.bars.iter().copied().max().unwrap_or(0);
                if highest > group.song().patterns_per_channel {
                    log::info!("growing patterns per channel to {}", highest);
                    group.grow_patterns(highest)?;
                }
                for (index, &bar) in plan.bars.iter().enumerate() {
                    group.set_bar_pattern(channel, bar, PastePlan::copied_number(copy, index))?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorOptions;
    use crate::models::NotePin;
    use crate::selection::Selection;

    #[test]
    fn test_noise_remap_builds_contiguous_run() {
        assert_eq!(remap_pitches_for_noise(&[60]), vec![0]);
        assert_eq!(remap_pitches_for_noise(&[65, 61]), vec![1, 2]);
        // 59 % 12 = 11, the run of three must fit below 12
        assert_eq!(remap_pitches_for_noise(&[59, 62, 66]), vec![9, 10, 11]);
    }

    #[test]
    fn test_noise_remap_clamps_bends() {
        let note = Note::with_pins(vec![60], 0, 4, vec![NotePin::new(0, 0, 6), NotePin::new(7, 4, 6)]);
        let remapped = note_for_noise(&note);
        assert_eq!(remapped.pitches, vec![0]);
        assert_eq!(remapped.end_pitch(), 7);
        let high = Note::with_pins(vec![71], 0, 4, vec![NotePin::new(0, 0, 6), NotePin::new(5, 4, 6)]);
        assert_eq!(note_for_noise(&high).end_pitch(), 11);
    }

    #[test]
    fn test_paste_notes_tiles_and_truncates() {
        let existing = Pattern::new(vec![Note::new(30, 0, 48, 6)], vec![0]);
        let copy = vec![Note::new(24, 0, 8, 6)];
        let pasted = paste_notes(&existing, &copy, 12, 36, 10, false);
        let spans: Vec<(i32, i32)> = pasted.notes.iter().map(|n| (n.start, n.end)).collect();
        assert_eq!(spans, vec![(0, 12), (12, 20), (22, 30), (32, 36), (36, 48)]);
    }

    #[test]
    fn test_paste_notes_keeps_continuation_only_at_bar_start() {
        let mut note = Note::new(24, 0, 8, 6);
        note.continues_last_pattern = true;
        let pasted = paste_notes(&Pattern::default(), &[note], 0, 16, 8, false);
        assert!(pasted.notes[0].continues_last_pattern);
        assert!(!pasted.notes[1].continues_last_pattern);
    }

    #[test]
    fn test_paste_in_range_past_bar_end_changes_nothing() {
        let mut song = Song::new(1, 0, 0, 2, 1);
        song.channels[0].bars = vec![1, 1];
        song.channels[0].patterns[0].notes = vec![Note::new(24, 0, 8, 6)];
        let mut engine = SelectionEngine::new(EditorOptions::default());
        engine.selection = Selection::single(0, 0);
        let payload = engine.copy_selection(&song).unwrap();

        engine.selection = Selection::single(0, 1).with_sub_bar(5000, 6000);
        let mut group = ChangeGroup::new(&mut song);
        let plan = PastePlan::new(&engine, group.song(), &payload);
        engine.paste_in_range(&mut group, &plan, &payload).unwrap();
        assert!(group.is_empty());
    }
}
