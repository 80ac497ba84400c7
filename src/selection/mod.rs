//! Selection-driven pattern editing
//!
//! A [`Selection`] is a rectangle of channels × bars with an optional
//! sub-bar time range. [`SelectionEngine`] turns it into edits: every
//! operation reads the song, builds its changes in a [`ChangeGroup`] and
//! hands the resulting command to a [`CommandRecorder`].
//!
//! Patterns can be shared by several bars. Operations that rewrite note
//! content first detach patterns that are also used outside the selected
//! bars, so bars outside the selection never change.

pub mod channel_ops;
pub mod note_ops;
pub mod paste_ops;
pub mod pitch_ops;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::EditorOptions;
use crate::errors::{EditorError, Result};
use crate::models::{ChannelKind, Pattern, Song};
use crate::undo::{ChangeGroup, CommandRecorder, CommandToken, EditKind};

/// Channel × bar box with an optional `[start, end)` part range
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Inclusive `[first, last]` bar indices
    pub bar_range: (usize, usize),
    /// Inclusive `[first, last]` channel indices
    pub channel_range: (usize, usize),
    #[serde(default)]
    pub sub_bar_range: Option<(i32, i32)>,
}

impl Selection {
    pub fn single(channel: usize, bar: usize) -> Self {
        Self {
            bar_range: (bar, bar),
            channel_range: (channel, channel),
            sub_bar_range: None,
        }
    }

    pub fn boxed(channels: (usize, usize), bars: (usize, usize)) -> Self {
        Self {
            bar_range: bars,
            channel_range: channels,
            sub_bar_range: None,
        }
    }

    pub fn with_sub_bar(mut self, start: i32, end: i32) -> Self {
        self.sub_bar_range = Some((start, end));
        self
    }

    pub fn bar_width(&self) -> usize {
        self.bar_range.1 - self.bar_range.0 + 1
    }

    pub fn channel_height(&self) -> usize {
        self.channel_range.1 - self.channel_range.0 + 1
    }

    /// Spans more than one bar or channel
    pub fn is_box(&self) -> bool {
        self.bar_width() > 1 || self.channel_height() > 1
    }

    pub fn pattern_selection_active(&self) -> bool {
        self.sub_bar_range.is_some()
    }

    pub fn validate(&self, song: &Song) -> Result<()> {
        let (bar_lo, bar_hi) = self.bar_range;
        let (channel_lo, channel_hi) = self.channel_range;
        if bar_lo > bar_hi || channel_lo > channel_hi {
            return Err(EditorError::InvalidSelection(format!("reversed range {:?}", self)));
        }
        if bar_hi >= song.bar_count {
            return Err(EditorError::BarOutOfRange(bar_hi));
        }
        if channel_hi >= song.channel_count() {
            return Err(EditorError::ChannelOutOfRange(channel_hi));
        }
        if let Some((start, end)) = self.sub_bar_range {
            if start < 0 || end <= start {
                return Err(EditorError::InvalidSelection(format!("empty part range {}..{}", start, end)));
            }
            if start >= song.parts_per_bar() {
                return Err(EditorError::InvalidSelection(format!(
                    "part range {}..{} starts past the bar end {}",
                    start,
                    end,
                    song.parts_per_bar()
                )));
            }
        }
        Ok(())
    }
}

/// Stateless note algorithms driven by a selection
///
/// The only state kept between calls is the token of the last recorded
/// operation of each kind, used to coalesce repeated edits.
#[derive(Clone, Debug)]
pub struct SelectionEngine {
    pub selection: Selection,
    pub options: EditorOptions,
    recent: HashMap<EditKind, CommandToken>,
}

impl SelectionEngine {
    pub fn new(options: EditorOptions) -> Self {
        Self {
            selection: Selection::single(0, 0),
            options,
            recent: HashMap::new(),
        }
    }

    pub fn each_selected_channel(&self) -> impl Iterator<Item = usize> {
        self.selection.channel_range.0..=self.selection.channel_range.1
    }

    pub fn each_selected_bar(&self) -> impl Iterator<Item = usize> {
        self.selection.bar_range.0..=self.selection.bar_range.1
    }

    /// Distinct non-empty pattern numbers reachable from the selected bars
    pub fn each_selected_pattern(&self, song: &Song, channel: usize) -> Result<Vec<usize>> {
        let mut handled = HashSet::new();
        let mut numbers = Vec::new();
        for bar in self.each_selected_bar() {
            let number = song.pattern_number(channel, bar)?;
            if number == 0 || !handled.insert(number) {
                continue;
            }
            // Resolve now so a dangling number fails before anything changes
            song.pattern(channel, number)?;
            numbers.push(number);
        }
        Ok(numbers)
    }

    /// Active `[start, end)` part range, clamped to the bar
    pub fn time_range(&self, song: &Song) -> (i32, i32) {
        let parts_per_bar = song.parts_per_bar();
        match self.selection.sub_bar_range {
            Some((start, end)) => (start.clamp(0, parts_per_bar), end.clamp(0, parts_per_bar)),
            None => (0, parts_per_bar),
        }
    }

    /// Run one operation as a single undo step
    ///
    /// `coalesce` states the caller's intent; the step is only merged into
    /// the previous one when that was the last operation of the same kind.
    pub(crate) fn commit<R, F>(
        &mut self,
        kind: EditKind,
        coalesce: bool,
        song: &mut Song,
        recorder: &mut R,
        build: F,
    ) -> Result<bool>
    where
        R: CommandRecorder + ?Sized,
        F: FnOnce(&Self, &mut ChangeGroup) -> Result<()>,
    {
        self.selection.validate(song)?;
        let can_coalesce = coalesce
            && self
                .recent
                .get(&kind)
                .map_or(false, |token| recorder.last_command_was(*token));

        let mut group = ChangeGroup::new(song);
        if let Err(err) = build(self, &mut group) {
            log::error!("{:?} failed, rolling back: {}", kind, err);
            group.rollback()?;
            return Err(err);
        }
        if group.is_empty() {
            log::debug!("{:?} changed nothing", kind);
            return Ok(false);
        }

        let token = recorder.issue_token(kind);
        self.recent.insert(kind, token);
        let recorded = recorder.record(group.finish(), token, can_coalesce);
        log::info!("recorded {:?} (coalesced: {})", kind, can_coalesce);
        Ok(recorded)
    }

    /// Detach patterns that selected bars share with unselected bars
    ///
    /// Within the selected bars, bars that shared a pattern keep sharing its
    /// duplicate. Only pattern numbers accepted by `filter` are considered.
    /// Returns the pattern number each original now maps to.
    pub(crate) fn detach_reused_patterns(
        &self,
        group: &mut ChangeGroup,
        channel: usize,
        filter: impl Fn(usize) -> bool,
    ) -> Result<HashMap<usize, usize>> {
        let (first, last) = self.selection.bar_range;
        let mut remap: HashMap<usize, usize> = HashMap::new();
        for bar in first..=last {
            let current = group.song().pattern_number(channel, bar)?;
            if current == 0 || !filter(current) {
                continue;
            }
            if let Some(&target) = remap.get(&current) {
                group.set_bar_pattern(channel, bar, target)?;
                continue;
            }
            let song = group.song();
            let used_elsewhere = song.channel(channel)?.bars[..song.bar_count]
                .iter()
                .enumerate()
                .any(|(other, &number)| (other < first || other > last) && number == current);
            if used_elsewhere {
                let copy = song.pattern(channel, current)?.clone();
                group.set_bar_pattern(channel, bar, 0)?;
                let fresh = group.ensure_pattern_exists(channel, bar)?;
                group.replace_pattern(channel, fresh, copy)?;
                log::debug!("channel {}: pattern {} duplicated as {}", channel, current, fresh);
                remap.insert(current, fresh);
            } else {
                remap.insert(current, current);
            }
        }
        Ok(remap)
    }

    /// Rewrite every distinct selected pattern of the channels accepted by
    /// `kinds`, duplicating shared patterns only where content changes
    pub(crate) fn rewrite_selected_patterns<F>(
        &self,
        group: &mut ChangeGroup,
        kinds: &[ChannelKind],
        mut rewrite: F,
    ) -> Result<()>
    where
        F: FnMut(&Song, usize, &Pattern) -> Option<Pattern>,
    {
        for channel in self.each_selected_channel() {
            if !kinds.contains(&group.song().channel_kind(channel)) {
                log::debug!("skipping channel {} for this operation", channel);
                continue;
            }
            let mut rewritten: Vec<(usize, Pattern)> = Vec::new();
            for number in self.each_selected_pattern(group.song(), channel)? {
                let song = group.song();
                let pattern = song.pattern(channel, number)?;
                if let Some(new) = rewrite(song, channel, pattern) {
                    if &new != pattern {
                        debug_assert!(new.is_well_formed());
                        rewritten.push((number, new));
                    }
                }
            }
            if rewritten.is_empty() {
                continue;
            }
            let changed: HashSet<usize> = rewritten.iter().map(|(number, _)| *number).collect();
            let remap = self.detach_reused_patterns(group, channel, |number| changed.contains(&number))?;
            for (number, pattern) in rewritten {
                let target = remap.get(&number).copied().unwrap_or(number);
                group.replace_pattern(channel, target, pattern)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;
    use crate::undo::History;

    fn song_with_shared_pattern() -> Song {
        let mut song = Song::new(1, 0, 0, 4, 2);
        song.channels[0].patterns[0].notes.push(Note::new(24, 0, 24, 6));
        song.channels[0].bars = vec![1, 1, 1, 0];
        song
    }

    #[test]
    fn test_each_selected_pattern_dedups() {
        let song = song_with_shared_pattern();
        let mut engine = SelectionEngine::new(EditorOptions::default());
        engine.selection = Selection::boxed((0, 0), (0, 3));
        assert_eq!(engine.each_selected_pattern(&song, 0).unwrap(), vec![1]);
    }

    #[test]
    fn test_time_range_defaults_to_whole_bar() {
        let song = song_with_shared_pattern();
        let mut engine = SelectionEngine::new(EditorOptions::default());
        assert_eq!(engine.time_range(&song), (0, song.parts_per_bar()));
        engine.selection = Selection::single(0, 0).with_sub_bar(12, 500);
        assert_eq!(engine.time_range(&song), (12, song.parts_per_bar()));
    }

    #[test]
    fn test_detach_keeps_selected_bars_sharing() {
        let mut song = song_with_shared_pattern();
        let mut engine = SelectionEngine::new(EditorOptions::default());
        engine.selection = Selection::boxed((0, 0), (0, 1));
        let mut group = ChangeGroup::new(&mut song);
        let remap = engine.detach_reused_patterns(&mut group, 0, |_| true).unwrap();
        assert_eq!(remap.get(&1), Some(&2));
        assert_eq!(group.song().channels[0].bars, vec![2, 2, 1, 0]);
    }

    #[test]
    fn test_invalid_selection_is_rejected() {
        let mut song = song_with_shared_pattern();
        let mut history = History::default();
        let mut engine = SelectionEngine::new(EditorOptions::default());
        engine.selection = Selection::boxed((0, 0), (0, 9));
        let result = engine.commit(EditKind::Merge, false, &mut song, &mut history, |_, _| Ok(()));
        assert_eq!(result, Err(EditorError::BarOutOfRange(9)));
    }
}
