//! Song document: channels, bars and the per-channel pattern arena
//!
//! Pattern number `n >= 1` in a bar refers to `channel.patterns[n - 1]`;
//! number 0 is an empty bar. Every channel owns exactly
//! `patterns_per_channel` pattern slots. Channels are ordered pitch first,
//! then noise, then mod, and a channel's kind follows from its index.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::pattern::Pattern;
use super::scale::{Rhythm, Scale, RHYTHMS, SCALES};
use crate::config::Config;
use crate::errors::{EditorError, Result};

#[derive(Serialize_repr, Deserialize_repr, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelKind {
    Pitch = 0,
    Noise = 1,
    Mod = 2,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Instrument {
    /// Optional narrowing of the channel's pitch range
    pub min_pitch: Option<i32>,
    pub max_pitch: Option<i32>,

    /// Channels targeted by each modulator slot (mod channels only)
    pub mod_targets: Vec<Option<usize>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub patterns: Vec<Pattern>,
    pub bars: Vec<usize>,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub muted: bool,
}

impl Channel {
    pub fn new(bar_count: usize, patterns_per_channel: usize) -> Self {
        Self {
            patterns: vec![Pattern::default(); patterns_per_channel],
            bars: vec![0; bar_count],
            instruments: vec![Instrument::default()],
            muted: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub scale: usize,
    pub rhythm: usize,
    pub beats_per_bar: i32,
    pub bar_count: usize,
    pub patterns_per_channel: usize,
    pub pitch_channel_count: usize,
    pub noise_channel_count: usize,
    pub mod_channel_count: usize,
    #[serde(default)]
    pub layered_instruments: bool,
    pub channels: Vec<Channel>,
}

impl Song {
    pub fn new(
        pitch_channels: usize,
        noise_channels: usize,
        mod_channels: usize,
        bar_count: usize,
        patterns_per_channel: usize,
    ) -> Self {
        let total = pitch_channels + noise_channels + mod_channels;
        Self {
            scale: 0,
            rhythm: 1,
            beats_per_bar: 8,
            bar_count,
            patterns_per_channel,
            pitch_channel_count: pitch_channels,
            noise_channel_count: noise_channels,
            mod_channel_count: mod_channels,
            layered_instruments: false,
            channels: (0..total).map(|_| Channel::new(bar_count, patterns_per_channel)).collect(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_kind(&self, channel: usize) -> ChannelKind {
        if channel < self.pitch_channel_count {
            ChannelKind::Pitch
        } else if channel < self.pitch_channel_count + self.noise_channel_count {
            ChannelKind::Noise
        } else {
            ChannelKind::Mod
        }
    }

    /// Index range `[first, last]` of the channels sharing `kind`
    pub fn kind_bounds(&self, kind: ChannelKind) -> (usize, usize) {
        let pitch_end = self.pitch_channel_count;
        let noise_end = pitch_end + self.noise_channel_count;
        let (first, end) = match kind {
            ChannelKind::Pitch => (0, pitch_end),
            ChannelKind::Noise => (pitch_end, noise_end),
            ChannelKind::Mod => (noise_end, self.channels.len()),
        };
        (first, end.saturating_sub(1))
    }

    pub fn parts_per_bar(&self) -> i32 {
        self.beats_per_bar * Config::PARTS_PER_BEAT
    }

    pub fn scale(&self) -> &Scale {
        SCALES.get(self.scale).unwrap_or(&SCALES[0])
    }

    pub fn rhythm(&self) -> &Rhythm {
        RHYTHMS.get(self.rhythm).unwrap_or(&RHYTHMS[1])
    }

    pub fn channel(&self, channel: usize) -> Result<&Channel> {
        self.channels.get(channel).ok_or(EditorError::ChannelOutOfRange(channel))
    }

    pub fn channel_mut(&mut self, channel: usize) -> Result<&mut Channel> {
        self.channels.get_mut(channel).ok_or(EditorError::ChannelOutOfRange(channel))
    }

    pub fn pattern_number(&self, channel: usize, bar: usize) -> Result<usize> {
        self.channel(channel)?
            .bars
            .get(bar)
            .copied()
            .ok_or(EditorError::BarOutOfRange(bar))
    }

    /// Pattern slot by number; a non-zero number must resolve
    pub fn pattern(&self, channel: usize, number: usize) -> Result<&Pattern> {
        let patterns = &self.channel(channel)?.patterns;
        number
            .checked_sub(1)
            .and_then(|index| patterns.get(index))
            .ok_or(EditorError::MissingPattern { channel, number })
    }

    pub fn pattern_mut(&mut self, channel: usize, number: usize) -> Result<&mut Pattern> {
        let patterns = &mut self.channel_mut(channel)?.patterns;
        number
            .checked_sub(1)
            .and_then(|index| patterns.get_mut(index))
            .ok_or(EditorError::MissingPattern { channel, number })
    }

    /// The pattern played at a bar, `None` for an empty bar
    pub fn get_pattern(&self, channel: usize, bar: usize) -> Result<Option<&Pattern>> {
        match self.pattern_number(channel, bar)? {
            0 => Ok(None),
            number => {
                let pattern = self.pattern(channel, number).map_err(|err| {
                    log::error!("bar {} of channel {} points at missing pattern {}", bar, channel, number);
                    err
                })?;
                Ok(Some(pattern))
            }
        }
    }

    /// No bar of the channel references this pattern number
    pub fn pattern_is_unused(&self, channel: usize, number: usize) -> bool {
        match self.channels.get(channel) {
            Some(ch) => !ch.bars.iter().take(self.bar_count).any(|&n| n == number),
            None => true,
        }
    }

    /// Some bar other than `bar` references this pattern number
    pub fn pattern_used_elsewhere(&self, channel: usize, number: usize, bar: usize) -> bool {
        match self.channels.get(channel) {
            Some(ch) => ch
                .bars
                .iter()
                .take(self.bar_count)
                .enumerate()
                .any(|(other, &n)| other != bar && n == number),
            None => false,
        }
    }

    /// Allowed pitch range for notes of a channel, narrowed by the
    /// pattern's first instrument when it declares limits
    pub fn pitch_range(&self, channel: usize, pattern: Option<&Pattern>) -> (i32, i32) {
        let (mut min, mut max) = match self.channel_kind(channel) {
            ChannelKind::Pitch => (0, Config::MAX_PITCH),
            ChannelKind::Noise => (0, Config::DRUM_COUNT - 1),
            ChannelKind::Mod => (0, Config::MOD_COUNT as i32 - 1),
        };
        let instrument = pattern
            .and_then(|p| p.instruments.first())
            .and_then(|&index| self.channels.get(channel)?.instruments.get(index));
        if let Some(instrument) = instrument {
            if let Some(lo) = instrument.min_pitch {
                min = lo.clamp(min, max);
            }
            if let Some(hi) = instrument.max_pitch {
                max = hi.clamp(min, max);
            }
        }
        (min, max)
    }

    /// Move channels `start..=end` by `offset` positions
    ///
    /// Mod targets are remapped so they keep following the moved channels.
    pub fn move_channels(&mut self, start: usize, end: usize, offset: isize) -> Result<()> {
        let count = self.channels.len();
        let new_start = start as isize + offset;
        let new_end = end as isize + offset;
        if start > end || end >= count || new_start < 0 || new_end >= count as isize {
            return Err(EditorError::InvalidSelection(format!(
                "cannot move channels {}..={} by {}",
                start, end, offset
            )));
        }
        let new_start = new_start as usize;

        let mut order: Vec<usize> = (0..count).collect();
        let block: Vec<usize> = order.drain(start..=end).collect();
        order.splice(new_start..new_start, block);

        let block: Vec<Channel> = self.channels.drain(start..=end).collect();
        self.channels.splice(new_start..new_start, block);

        let mut new_position = vec![0; count];
        for (position, &old) in order.iter().enumerate() {
            new_position[old] = position;
        }
        for channel in self.channels.iter_mut() {
            for instrument in channel.instruments.iter_mut() {
                for target in instrument.mod_targets.iter_mut() {
                    if let Some(index) = target {
                        if let Some(&moved) = new_position.get(*index) {
                            *index = moved;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Structural consistency of a loaded song
    pub fn validate(&self) -> Result<()> {
        let expected = self.pitch_channel_count + self.noise_channel_count + self.mod_channel_count;
        if self.channels.len() != expected {
            return Err(EditorError::MalformedSong(format!(
                "song declares {} channels but has {}",
                expected,
                self.channels.len()
            )));
        }
        for (index, channel) in self.channels.iter().enumerate() {
            if channel.bars.len() < self.bar_count {
                return Err(EditorError::BarOutOfRange(self.bar_count - 1));
            }
            if channel.patterns.len() != self.patterns_per_channel {
                return Err(EditorError::MissingPattern {
                    channel: index,
                    number: self.patterns_per_channel,
                });
            }
            if let Some(&number) = channel.bars.iter().find(|&&n| n > self.patterns_per_channel) {
                return Err(EditorError::MissingPattern { channel: index, number });
            }
            for (slot, pattern) in channel.patterns.iter().enumerate() {
                if let Some(note) = pattern.notes.iter().find(|note| !note.is_valid()) {
                    return Err(EditorError::MalformedSong(format!(
                        "channel {} pattern {} has an invalid note at {}",
                        index,
                        slot + 1,
                        note.start
                    )));
                }
                // With valid notes this also rules out unsorted starts
                if !pattern.is_well_formed() {
                    return Err(EditorError::MalformedSong(format!(
                        "channel {} pattern {} has unsorted or overlapping notes",
                        index,
                        slot + 1
                    )));
                }
            }
        }
        Ok(())
    }
}
