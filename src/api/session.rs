//! Editing session: one song with its history, selection and clipboard
//!
//! The session is the plain-Rust surface the WASM functions wrap. It can be
//! driven directly from native code and tests.

use serde::{Deserialize, Serialize};

use crate::clipboard::Clipboard;
use crate::config::EditorOptions;
use crate::errors::{EditorError, Result};
use crate::models::Song;
use crate::selection::{Selection, SelectionEngine};
use crate::undo::History;

/// One engine operation, as sent by the UI
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    Merge,
    Bridge { do_bends: bool },
    Separate {
        cuts: usize,
        #[serde(default)]
        x1: Option<i32>,
        #[serde(default)]
        x2: Option<i32>,
    },
    Partition,
    Flatten { pitch_only: bool },
    RemoveSpace,
    Spread { include_edges: bool },
    Mirror { vertical: bool },
    Stretch { old_x1: i32, old_x2: i32, new_x1: i32, new_x2: i32 },
    Transpose { upward: bool, octave: bool },
    ForceRhythm,
    ForceScale,
    Copy,
    Paste,
    PasteNumbers,
    Mute { all: bool },
    Solo,
    MoveChannels { offset: isize },
    SelectInstrument { instrument: usize, multi: bool },
    DuplicateReusedPatterns,
}

/// What the UI needs to refresh after an operation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub changed: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub selection: Selection,
}

#[derive(Debug)]
pub struct EditorSession {
    song: Song,
    history: History,
    engine: SelectionEngine,
    clipboard: Clipboard,
}

impl EditorSession {
    pub fn new(song: Song, options: EditorOptions) -> Result<Self> {
        Self::with_clipboard(song, options, Clipboard::default())
    }

    pub fn with_clipboard(song: Song, options: EditorOptions, clipboard: Clipboard) -> Result<Self> {
        song.validate()?;
        log::info!(
            "session opened: {} channel(s), {} bar(s), {} pattern(s) per channel",
            song.channel_count(),
            song.bar_count,
            song.patterns_per_channel
        );
        Ok(Self {
            song,
            history: History::new(options.max_history),
            engine: SelectionEngine::new(options),
            clipboard,
        })
    }

    pub fn from_json(song_json: &str, options: EditorOptions) -> Result<Self> {
        let song: Song = serde_json::from_str(song_json)?;
        Self::new(song, options)
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn song_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.song)?)
    }

    /// Replace the song; history no longer applies and is dropped
    pub fn load_song(&mut self, song: Song) -> Result<()> {
        song.validate()?;
        self.song = song;
        self.history.clear();
        self.engine.selection = Selection::single(0, 0);
        Ok(())
    }

    pub fn selection(&self) -> Selection {
        self.engine.selection
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<()> {
        selection.validate(&self.song)?;
        self.engine.selection = selection;
        Ok(())
    }

    pub fn options(&self) -> &EditorOptions {
        &self.engine.options
    }

    pub fn set_options(&mut self, options: EditorOptions) {
        self.history.set_max_size(options.max_history);
        self.engine.options = options;
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn apply(&mut self, operation: &Operation) -> Result<OperationResult> {
        log::debug!("applying {:?}", operation);
        let engine = &mut self.engine;
        let song = &mut self.song;
        let history = &mut self.history;
        let changed = match *operation {
            Operation::Merge => engine.merge_notes(song, history)?,
            Operation::Bridge { do_bends } => engine.bridge_notes(song, history, do_bends)?,
            Operation::Separate { cuts, x1, x2 } => engine.separate_notes(song, history, cuts, x1, x2)?,
            Operation::Partition => engine.partition_notes(song, history)?,
            Operation::Flatten { pitch_only } => engine.flatten_notes(song, history, pitch_only)?,
            Operation::RemoveSpace => engine.remove_space(song, history)?,
            Operation::Spread { include_edges } => engine.spread_evenly(song, history, include_edges)?,
            Operation::Mirror { vertical } => engine.mirror_notes(song, history, vertical)?,
            Operation::Stretch {
                old_x1,
                old_x2,
                new_x1,
                new_x2,
            } => engine.stretch_notes(song, history, old_x1, old_x2, new_x1, new_x2)?,
            Operation::Transpose { upward, octave } => engine.transpose(song, history, upward, octave)?,
            Operation::ForceRhythm => engine.force_rhythm(song, history)?,
            Operation::ForceScale => engine.force_scale(song, history)?,
            Operation::Copy => {
                engine.copy(song, &mut self.clipboard)?;
                false
            }
            Operation::Paste => engine.paste(song, history, &self.clipboard)?,
            Operation::PasteNumbers => engine.paste_numbers(song, history, &self.clipboard)?,
            Operation::Mute { all } => engine.mute_channels(song, history, all)?,
            Operation::Solo => engine.solo_channels(song, history)?,
            Operation::MoveChannels { offset } => engine.move_channels(song, history, offset)?,
            Operation::SelectInstrument { instrument, multi } => {
                engine.select_instrument(song, history, instrument, multi)?
            }
            Operation::DuplicateReusedPatterns => engine.duplicate_reused_patterns(song, history)?,
        };
        Ok(self.result(changed))
    }

    pub fn undo(&mut self) -> Result<OperationResult> {
        self.history.undo(&mut self.song)?;
        self.clamp_selection();
        Ok(self.result(true))
    }

    pub fn redo(&mut self) -> Result<OperationResult> {
        self.history.redo(&mut self.song)?;
        self.clamp_selection();
        Ok(self.result(true))
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn result(&self, changed: bool) -> OperationResult {
        OperationResult {
            changed,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            selection: self.engine.selection,
        }
    }

    fn clamp_selection(&mut self) {
        if self.engine.selection.validate(&self.song).is_err() {
            log::debug!("selection no longer fits the song, resetting");
            self.engine.selection = Selection::single(0, 0);
        }
    }
}

/// Parse options sent by the UI, falling back to defaults for a blank string
pub fn parse_options(options_json: &str) -> Result<EditorOptions> {
    if options_json.trim().is_empty() {
        return Ok(EditorOptions::default());
    }
    serde_json::from_str(options_json).map_err(EditorError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;

    fn session() -> EditorSession {
        let mut song = Song::new(1, 1, 0, 4, 2);
        song.channels[0].bars = vec![1, 0, 0, 0];
        song.channels[0].patterns[0].notes = vec![Note::new(60, 0, 4, 6), Note::new(67, 8, 12, 6)];
        EditorSession::new(song, EditorOptions::default()).unwrap()
    }

    #[test]
    fn test_operation_wire_format() {
        let op: Operation = serde_json::from_str(r#"{"op": "bridge", "doBends": false}"#).unwrap();
        assert_eq!(op, Operation::Bridge { do_bends: false });
        let op: Operation = serde_json::from_str(r#"{"op": "separate", "cuts": 1}"#).unwrap();
        assert_eq!(op, Operation::Separate { cuts: 1, x1: None, x2: None });
        let op: Operation = serde_json::from_str(r#"{"op": "moveChannels", "offset": -1}"#).unwrap();
        assert_eq!(op, Operation::MoveChannels { offset: -1 });
    }

    #[test]
    fn test_apply_then_undo_restores_song() {
        let mut session = session();
        let before = session.song().clone();
        let result = session.apply(&Operation::Merge).unwrap();
        assert!(result.changed && result.can_undo);
        assert_eq!(session.song().channels[0].patterns[0].notes.len(), 1);
        let result = session.undo().unwrap();
        assert!(result.can_redo);
        assert_eq!(session.song(), &before);
    }

    #[test]
    fn test_copy_is_not_an_undo_step() {
        let mut session = session();
        let result = session.apply(&Operation::Copy).unwrap();
        assert!(!result.changed && !result.can_undo);
        assert!(session.clipboard().load().is_some());
    }

    #[test]
    fn test_rejects_selection_outside_song() {
        let mut session = session();
        assert_eq!(
            session.set_selection(Selection::single(5, 0)),
            Err(EditorError::ChannelOutOfRange(5))
        );
        assert!(matches!(
            session.set_selection(Selection::single(0, 0).with_sub_bar(5000, 6000)),
            Err(EditorError::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_rejects_song_with_overlapping_notes() {
        let mut song = Song::new(1, 0, 0, 2, 1);
        song.channels[0].bars[0] = 1;
        song.channels[0].patterns[0].notes =
            vec![Note::new(60, 0, 100, 6), Note::new(62, 10, 20, 6), Note::new(64, 5, 8, 6)];
        let json = serde_json::to_string(&song).unwrap();
        assert!(matches!(
            EditorSession::from_json(&json, EditorOptions::default()),
            Err(EditorError::MalformedSong(_))
        ));
    }

    #[test]
    fn test_new_history_depth_applies_immediately() {
        let mut session = session();
        session.apply(&Operation::Merge).unwrap();
        session.apply(&Operation::Mute { all: true }).unwrap();
        session.apply(&Operation::Solo).unwrap();
        session.set_options(EditorOptions {
            max_history: 1,
            ..EditorOptions::default()
        });
        session.undo().unwrap();
        assert!(!session.can_undo());

        session.apply(&Operation::Mute { all: true }).unwrap();
        session.apply(&Operation::Mute { all: true }).unwrap();
        session.undo().unwrap();
        assert!(!session.can_undo());
    }

    #[test]
    fn test_blank_options_use_defaults() {
        assert_eq!(parse_options("").unwrap(), EditorOptions::default());
        assert!(parse_options(r#"{"notesOutsideScale": true}"#).unwrap().notes_outside_scale);
    }
}
