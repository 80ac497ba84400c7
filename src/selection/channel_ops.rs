//! Channel and instrument metadata: mute, solo, reorder, instrument choice

use std::collections::BTreeSet;

use super::SelectionEngine;
use crate::config::Config;
use crate::errors::Result;
use crate::models::{ChannelKind, Song};
use crate::undo::{CommandRecorder, EditKind};

const ALL_CHANNELS: &[ChannelKind] = &[ChannelKind::Pitch, ChannelKind::Noise, ChannelKind::Mod];

/// Instrument list after choosing `instrument`
///
/// A layered toggle adds or removes one instrument but never empties the
/// list or exceeds the layer limit; otherwise the choice replaces the list.
pub fn choose_instruments(current: &[usize], instrument: usize, layered: bool) -> Vec<usize> {
    if !layered {
        return vec![instrument];
    }
    let mut chosen = current.to_vec();
    if let Some(index) = chosen.iter().position(|&i| i == instrument) {
        if chosen.len() > 1 {
            chosen.remove(index);
        }
    } else if chosen.len() < Config::LAYERED_INSTRUMENT_COUNT_MAX {
        chosen.push(instrument);
        chosen.sort_unstable();
    }
    chosen
}

impl SelectionEngine {
    /// Channels whose playback a solo of the selection keeps audible
    ///
    /// A single selected mod channel stands for the channels its modulators
    /// target. With no valid target it solos itself.
    pub fn solo_scope(&self, song: &Song) -> Result<BTreeSet<usize>> {
        let (first, last) = self.selection.channel_range;
        let mut scope: BTreeSet<usize> = (first..=last).collect();
        if first == last && song.channel_kind(first) == ChannelKind::Mod {
            let bar = self.selection.bar_range.0;
            let instrument = song
                .get_pattern(first, bar)?
                .and_then(|pattern| pattern.instruments.first().copied())
                .unwrap_or(0);
            if let Some(targets) = song.channel(first)?.instruments.get(instrument) {
                let targeted: BTreeSet<usize> = targets
                    .mod_targets
                    .iter()
                    .flatten()
                    .copied()
                    .filter(|&target| target < song.channel_count())
                    .collect();
                if !targeted.is_empty() {
                    scope = targeted;
                }
            }
        }
        Ok(scope)
    }

    /// Toggle mute on the selected channels, or on every channel with `all`
    pub fn mute_channels<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        all: bool,
    ) -> Result<bool> {
        self.commit(EditKind::Mute, false, song, recorder, |engine, group| {
            let scope: Vec<usize> = if all {
                (0..group.song().channel_count()).collect()
            } else {
                engine.each_selected_channel().collect()
            };
            let song = group.song();
            let mute = if all {
                !scope.iter().any(|&channel| song.channels[channel].muted)
            } else {
                scope.iter().any(|&channel| !song.channels[channel].muted)
            };
            for channel in scope {
                group.set_muted(channel, mute)?;
            }
            Ok(())
        })
    }

    /// Mute everything outside the selection; repeating it unmutes everything
    pub fn solo_channels<R: CommandRecorder + ?Sized>(&mut self, song: &mut Song, recorder: &mut R) -> Result<bool> {
        self.commit(EditKind::Solo, false, song, recorder, |engine, group| {
            let scope = engine.solo_scope(group.song())?;
            let song = group.song();
            let already_soloed = song
                .channels
                .iter()
                .enumerate()
                .all(|(channel, state)| state.muted != scope.contains(&channel));
            log::debug!("solo {:?} (already soloed: {})", scope, already_soloed);
            for channel in 0..song.channel_count() {
                let muted = !already_soloed && !scope.contains(&channel);
                group.set_muted(channel, muted)?;
            }
            Ok(())
        })
    }

    /// Move the selected channels by `offset` within their category
    ///
    /// The selection follows the moved block. Consecutive moves coalesce.
    pub fn move_channels<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        offset: isize,
    ) -> Result<bool> {
        let (start, end) = self.selection.channel_range;
        let kind = song.channel_kind(start);
        let (lowest, highest) = song.kind_bounds(kind);
        let new_start = start as isize + offset;
        let new_end = end as isize + offset;
        if offset == 0
            || song.channel_kind(end) != kind
            || new_start < lowest as isize
            || new_end > highest as isize
        {
            log::debug!("channels {}..={} cannot move by {}", start, end, offset);
            return Ok(false);
        }
        let moved = self.commit(EditKind::ChannelOrder, true, song, recorder, |_, group| {
            group.move_channels(start, end, offset)
        })?;
        if moved {
            self.selection.channel_range = (new_start as usize, new_end as usize);
        }
        Ok(moved)
    }

    /// Set or toggle the instrument used by the selected patterns
    ///
    /// `multi` layers instruments on songs with layered instruments
    /// enabled; mod channels always take a single instrument.
    pub fn select_instrument<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
        instrument: usize,
        multi: bool,
    ) -> Result<bool> {
        self.commit(EditKind::Instruments, false, song, recorder, |engine, group| {
            engine.rewrite_selected_patterns(group, ALL_CHANNELS, |song, channel, pattern| {
                if instrument >= song.channels[channel].instruments.len() {
                    log::warn!("channel {} has no instrument {}", channel, instrument);
                    return None;
                }
                let layered = multi && song.layered_instruments && song.channel_kind(channel) != ChannelKind::Mod;
                let mut updated = pattern.clone();
                updated.instruments = choose_instruments(&pattern.instruments, instrument, layered);
                Some(updated)
            })
        })
    }

    /// Give the selected bars their own copies of patterns shared with
    /// bars outside the selection
    pub fn duplicate_reused_patterns<R: CommandRecorder + ?Sized>(
        &mut self,
        song: &mut Song,
        recorder: &mut R,
    ) -> Result<bool> {
        self.commit(EditKind::DuplicatePatterns, false, song, recorder, |engine, group| {
            for channel in engine.each_selected_channel() {
                engine.detach_reused_patterns(group, channel, |_| true)?;
            }
            Ok(())
        })
    }
}
