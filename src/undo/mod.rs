//! Reversible song edits and the undo history
//!
//! Every change the editing engine makes to a [`Song`] goes through a
//! [`Command`]. Commands are applied as they are appended to a
//! [`ChangeGroup`], the same way the history replays them later, and the
//! finished group is handed to a [`CommandRecorder`] as one undo step.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::Config;
use crate::errors::{EditorError, Result};
use crate::models::{Pattern, Song};

/// Represents a reversible edit command
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Point a bar at another pattern number
    SetBarPattern {
        channel: usize,
        bar: usize,
        old: usize,
        new: usize,
    },
    /// Swap the contents of a pattern slot
    ReplacePattern {
        channel: usize,
        number: usize,
        old: Pattern,
        new: Pattern,
    },
    /// Add empty pattern slots to every channel
    GrowPatterns { old: usize, new: usize },
    SetMuted { channel: usize, old: bool, new: bool },
    /// Move the channel block `start..=end` by `offset`
    MoveChannels {
        start: usize,
        end: usize,
        offset: isize,
    },
    /// A group of commands applied in order and undone in reverse
    Batch { commands: Vec<Command> },
}

fn mismatch(what: String) -> EditorError {
    log::error!("undo history out of sync: {}", what);
    EditorError::HistoryMismatch(what)
}

impl Command {
    /// Applying this command would not change the song
    pub fn is_noop(&self) -> bool {
        match self {
            Command::SetBarPattern { old, new, .. } => old == new,
            Command::ReplacePattern { old, new, .. } => old == new,
            Command::GrowPatterns { old, new } => old == new,
            Command::SetMuted { old, new, .. } => old == new,
            Command::MoveChannels { offset, .. } => *offset == 0,
            Command::Batch { commands } => commands.iter().all(Command::is_noop),
        }
    }

    /// Execute this command on the song
    pub fn execute(&self, song: &mut Song) -> Result<()> {
        match self {
            Command::SetBarPattern { channel, bar, old, new } => {
                set_bar(song, *channel, *bar, *old, *new)
            }
            Command::ReplacePattern { channel, number, old, new } => {
                swap_pattern(song, *channel, *number, old, new)
            }
            Command::GrowPatterns { old, new } => {
                if song.patterns_per_channel != *old || new < old {
                    return Err(mismatch(format!(
                        "cannot grow patterns from {} to {} with {} slots",
                        old, new, song.patterns_per_channel
                    )));
                }
                for channel in song.channels.iter_mut() {
                    channel.patterns.resize_with(*new, Pattern::default);
                }
                song.patterns_per_channel = *new;
                Ok(())
            }
            Command::SetMuted { channel, old, new } => set_muted(song, *channel, *old, *new),
            Command::MoveChannels { start, end, offset } => song.move_channels(*start, *end, *offset),
            Command::Batch { commands } => {
                for cmd in commands {
                    cmd.execute(song)?;
                }
                Ok(())
            }
        }
    }

    /// Undo this command (reverse the operation)
    pub fn undo(&self, song: &mut Song) -> Result<()> {
        match self {
            Command::SetBarPattern { channel, bar, old, new } => {
                set_bar(song, *channel, *bar, *new, *old)
            }
            Command::ReplacePattern { channel, number, old, new } => {
                swap_pattern(song, *channel, *number, new, old)
            }
            Command::GrowPatterns { old, new } => {
                if song.patterns_per_channel != *new {
                    return Err(mismatch(format!(
                        "cannot shrink patterns to {} from {} slots",
                        old, song.patterns_per_channel
                    )));
                }
                for channel in song.channels.iter_mut() {
                    channel.patterns.truncate(*old);
                    for number in channel.bars.iter_mut() {
                        if *number > *old {
                            *number = 0;
                        }
                    }
                }
                song.patterns_per_channel = *old;
                Ok(())
            }
            Command::SetMuted { channel, old, new } => set_muted(song, *channel, *new, *old),
            Command::MoveChannels { start, end, offset } => {
                let start = (*start as isize + offset) as usize;
                let end = (*end as isize + offset) as usize;
                song.move_channels(start, end, -offset)
            }
            Command::Batch { commands } => {
                // Undo batch in reverse order
                for cmd in commands.iter().rev() {
                    cmd.undo(song)?;
                }
                Ok(())
            }
        }
    }
}

fn set_bar(song: &mut Song, channel: usize, bar: usize, expected: usize, value: usize) -> Result<()> {
    if value > song.patterns_per_channel {
        return Err(EditorError::MissingPattern { channel, number: value });
    }
    let slot = song
        .channel_mut(channel)?
        .bars
        .get_mut(bar)
        .ok_or(EditorError::BarOutOfRange(bar))?;
    if *slot != expected {
        return Err(mismatch(format!(
            "bar {} of channel {} holds {}, expected {}",
            bar, channel, slot, expected
        )));
    }
    *slot = value;
    Ok(())
}

fn swap_pattern(song: &mut Song, channel: usize, number: usize, expected: &Pattern, value: &Pattern) -> Result<()> {
    let pattern = song.pattern_mut(channel, number)?;
    if pattern != expected {
        return Err(mismatch(format!("pattern {} of channel {} changed", number, channel)));
    }
    *pattern = value.clone();
    Ok(())
}

fn set_muted(song: &mut Song, channel: usize, expected: bool, value: bool) -> Result<()> {
    let channel_state = song.channel_mut(channel)?;
    if channel_state.muted != expected {
        return Err(mismatch(format!("mute flag of channel {} changed", channel)));
    }
    channel_state.muted = value;
    Ok(())
}

/// Builder for one undo step
///
/// Each appended command is executed immediately so later steps of the same
/// operation observe its effect. A failed operation calls [`rollback`] to
/// restore the song.
///
/// [`rollback`]: ChangeGroup::rollback
pub struct ChangeGroup<'s> {
    song: &'s mut Song,
    commands: Vec<Command>,
}

impl<'s> ChangeGroup<'s> {
    pub fn new(song: &'s mut Song) -> Self {
        Self {
            song,
            commands: Vec::new(),
        }
    }

    pub fn song(&self) -> &Song {
        &*self.song
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Execute and keep a command; no-ops are dropped
    pub fn apply(&mut self, command: Command) -> Result<()> {
        if command.is_noop() {
            return Ok(());
        }
        command.execute(self.song)?;
        self.commands.push(command);
        Ok(())
    }

    /// Undo everything applied so far
    pub fn rollback(self) -> Result<()> {
        for command in self.commands.iter().rev() {
            command.undo(self.song)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Command {
        Command::Batch {
            commands: self.commands,
        }
    }

    pub fn set_bar_pattern(&mut self, channel: usize, bar: usize, number: usize) -> Result<()> {
        let old = self.song.pattern_number(channel, bar)?;
        self.apply(Command::SetBarPattern {
            channel,
            bar,
            old,
            new: number,
        })
    }

    pub fn replace_pattern(&mut self, channel: usize, number: usize, pattern: Pattern) -> Result<()> {
        let old = self.song.pattern(channel, number)?.clone();
        self.apply(Command::ReplacePattern {
            channel,
            number,
            old,
            new: pattern,
        })
    }

    pub fn grow_patterns(&mut self, count: usize) -> Result<()> {
        let old = self.song.patterns_per_channel;
        if count <= old {
            return Ok(());
        }
        self.apply(Command::GrowPatterns { old, new: count })
    }

    pub fn set_muted(&mut self, channel: usize, muted: bool) -> Result<()> {
        let old = self.song.channel(channel)?.muted;
        self.apply(Command::SetMuted {
            channel,
            old,
            new: muted,
        })
    }

    pub fn move_channels(&mut self, start: usize, end: usize, offset: isize) -> Result<()> {
        self.apply(Command::MoveChannels { start, end, offset })
    }

    /// Give an empty bar a pattern to write into
    ///
    /// Reuses the first slot that is empty and referenced by no bar,
    /// otherwise adds a slot to every channel. Returns the bar's pattern
    /// number (unchanged when the bar already had one).
    pub fn ensure_pattern_exists(&mut self, channel: usize, bar: usize) -> Result<usize> {
        let current = self.song.pattern_number(channel, bar)?;
        if current != 0 {
            return Ok(current);
        }
        let free = self
            .song
            .channel(channel)?
            .patterns
            .iter()
            .enumerate()
            .map(|(index, pattern)| (index + 1, pattern))
            .find(|(number, pattern)| pattern.is_empty() && self.song.pattern_is_unused(channel, *number))
            .map(|(number, _)| number);
        let number = match free {
            Some(number) => number,
            None => {
                let number = self.song.patterns_per_channel + 1;
                self.grow_patterns(number)?;
                number
            }
        };
        self.set_bar_pattern(channel, bar, number)?;
        Ok(number)
    }

    /// Clear a bar; if its pattern is then unused, empty it for reuse
    pub fn erase_pattern_in_bar(&mut self, channel: usize, bar: usize) -> Result<()> {
        let removed = self.song.pattern_number(channel, bar)?;
        if removed == 0 {
            return Ok(());
        }
        self.set_bar_pattern(channel, bar, 0)?;
        if self.song.pattern_is_unused(channel, removed) {
            let mut cleared = self.song.pattern(channel, removed)?.clone();
            cleared.notes.clear();
            self.replace_pattern(channel, removed, cleared)?;
        }
        Ok(())
    }

    /// Make sure the pattern at `bar` is referenced by no other bar
    ///
    /// A shared pattern is deep-copied into a fresh slot and the bar is
    /// rebound to it. Returns the pattern number to mutate, 0 for an empty bar.
    pub fn ensure_exclusive(&mut self, channel: usize, bar: usize) -> Result<usize> {
        let number = self.song.pattern_number(channel, bar)?;
        if number == 0 || !self.song.pattern_used_elsewhere(channel, number, bar) {
            return Ok(number);
        }
        let copy = self.song.pattern(channel, number)?.clone();
        self.set_bar_pattern(channel, bar, 0)?;
        let fresh = self.ensure_pattern_exists(channel, bar)?;
        self.replace_pattern(channel, fresh, copy)?;
        log::debug!("duplicated pattern {} of channel {} into {} for bar {}", number, channel, fresh, bar);
        Ok(fresh)
    }
}

/// Kinds of editing operation, used to decide coalescing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    Merge,
    Bridge,
    Separate,
    Partition,
    Flatten,
    RemoveSpace,
    Spread,
    Mirror,
    Stretch,
    Transpose,
    ForceRhythm,
    ForceScale,
    Paste,
    PasteNumbers,
    DuplicatePatterns,
    Mute,
    Solo,
    ChannelOrder,
    Instruments,
}

/// Identity of one recorded operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandToken {
    pub kind: EditKind,
    pub serial: u64,
}

/// The undo-history side of the editor
pub trait CommandRecorder {
    /// Hand out a fresh token for an operation about to be recorded
    fn issue_token(&mut self, kind: EditKind) -> CommandToken;

    /// Record an already-applied command. With `can_coalesce` the command is
    /// merged into the latest undo step instead of pushing a new one.
    /// Returns false when nothing was recorded.
    fn record(&mut self, command: Command, token: CommandToken, can_coalesce: bool) -> bool;

    /// The latest undo step was recorded under `token`
    fn last_command_was(&self, token: CommandToken) -> bool;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct HistoryEntry {
    command: Command,
    token: CommandToken,
}

/// Manages undo/redo command history with coalescing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    /// Current position in the stack (for redo support)
    current_index: usize,
    /// Maximum number of commands to keep in history
    max_size: usize,
    next_serial: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new(Config::DEFAULT_HISTORY_SIZE)
    }
}

impl History {
    /// Create a new history with specified maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            current_index: 0,
            max_size: max_size.max(1),
            next_serial: 1,
        }
    }

    /// Undo the last command
    pub fn undo(&mut self, song: &mut Song) -> Result<()> {
        if !self.can_undo() {
            return Err(EditorError::NoUndoHistory);
        }
        let entry = &self.entries[self.current_index - 1];
        entry.command.undo(song)?;
        self.current_index -= 1;
        Ok(())
    }

    /// Redo the last undone command
    pub fn redo(&mut self, song: &mut Song) -> Result<()> {
        if !self.can_redo() {
            return Err(EditorError::NoRedoHistory);
        }
        let entry = &self.entries[self.current_index];
        entry.command.execute(song)?;
        self.current_index += 1;
        Ok(())
    }

    /// Change the maximum depth, dropping the oldest steps that no longer fit
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
            self.current_index = self.current_index.saturating_sub(1);
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index < self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_index = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.current_index
    }

    pub fn redo_count(&self) -> usize {
        self.entries.len() - self.current_index
    }
}

impl CommandRecorder for History {
    fn issue_token(&mut self, kind: EditKind) -> CommandToken {
        let token = CommandToken {
            kind,
            serial: self.next_serial,
        };
        self.next_serial += 1;
        token
    }

    fn record(&mut self, command: Command, token: CommandToken, can_coalesce: bool) -> bool {
        if command.is_noop() {
            return false;
        }
        if can_coalesce && self.can_undo() && !self.can_redo() {
            if let Some(last) = self.entries.back_mut() {
                let previous = std::mem::replace(&mut last.command, Command::Batch { commands: Vec::new() });
                let mut commands = match previous {
                    Command::Batch { commands } => commands,
                    other => vec![other],
                };
                commands.push(command);
                last.command = Command::Batch { commands };
                last.token = token;
                log::debug!("coalesced {:?} into previous undo step", token.kind);
                return true;
            }
        }

        // Truncate any redo history when new command is added
        self.entries.truncate(self.current_index);
        self.entries.push_back(HistoryEntry { command, token });
        self.current_index = self.entries.len();

        // Enforce max size
        if self.entries.len() > self.max_size {
            self.entries.pop_front();
            self.current_index = self.current_index.saturating_sub(1);
        }
        true
    }

    fn last_command_was(&self, token: CommandToken) -> bool {
        !self.can_redo()
            && self
                .current_index
                .checked_sub(1)
                .and_then(|index| self.entries.get(index))
                .map_or(false, |entry| entry.token == token)
    }
}
